#![allow(dead_code)]

use inputwatch::{EventTime, InputEvent};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[path = "../../src/test_util.rs"]
mod test_util;

pub(crate) use test_util::TestDir;

/// How long a worker may take to notice a cancellation.
pub const GRACE: Duration = Duration::from_secs(5);

/// A named pipe standing in for an event device node.
pub struct FakeDevice {
    pub path: PathBuf,
    writer: File,
}

impl FakeDevice {
    pub fn create(dir: &Path, node: &str) -> Self {
        let path = dir.join(node);
        let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();

        let res = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(res, 0, "mkfifo: {}", io::Error::last_os_error());

        // Opening a FIFO read-write never blocks and keeps it open until the fake is dropped.
        let writer = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();

        Self { path, writer }
    }

    pub fn emit(&mut self, ev: &InputEvent) {
        self.write_raw(&ev.encode());
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).unwrap();
        self.writer.flush().unwrap();
    }
}

pub fn key_event(code: u16, value: i32, usec: i64) -> InputEvent {
    InputEvent {
        time: EventTime {
            sec: 1_700_000_000,
            usec,
        },
        ty: 1,
        code,
        value,
    }
}
