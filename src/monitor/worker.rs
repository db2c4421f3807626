use crate::event::{InputEvent, EVENT_SIZE};
use crate::monitor::CancelToken;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

/// The maximum number of events to read at once.
const MAX_INPUT_EV: usize = 64;

/// Why a worker stopped streaming events.
///
/// Whatever the reason, the queue of the worker is closed once it stops.
#[derive(Debug)]
pub enum CloseReason {
    /// The device file could not be opened. No event was published.
    OpenFailed(io::Error),
    /// Reading from the device failed (e.g. the device was unplugged).
    ReadFailed(io::Error),
    /// The session was cancelled.
    Cancelled,
    /// The receiving end of the queue was dropped.
    Disconnected,
    /// The worker task was aborted or panicked.
    Aborted,
}

impl CloseReason {
    /// Whether the worker stopped because of an error rather than a request.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CloseReason::OpenFailed(_) | CloseReason::ReadFailed(_) | CloseReason::Aborted
        )
    }
}

/// An input device file opened in non-blocking mode.
#[derive(Debug)]
pub(crate) struct EventDevice {
    async_fd: AsyncFd<File>,
    /// Bytes read but not yet decoded.
    pending: Vec<u8>,
}

impl EventDevice {
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;

        Ok(Self {
            async_fd: AsyncFd::new(file)?,
            pending: Vec::with_capacity(EVENT_SIZE * MAX_INPUT_EV),
        })
    }

    /// Wait for the next event.
    ///
    /// This is cancel safe: if the future is dropped, no event is lost.
    pub(crate) async fn next_event(&mut self) -> io::Result<InputEvent> {
        while self.pending.len() < EVENT_SIZE {
            self.fill().await?;
        }

        let event = InputEvent::decode(&self.pending[..EVENT_SIZE])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.pending.drain(..EVENT_SIZE);

        Ok(event)
    }

    async fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; EVENT_SIZE * MAX_INPUT_EV];

        loop {
            let mut guard = self.async_fd.readable().await?;

            match guard.try_io(|inner| inner.get_ref().read(&mut chunk)) {
                Ok(Ok(0)) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(Ok(n)) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => return Err(e),
                // Spurious wakeup, the readiness was cleared:
                Err(_would_block) => continue,
            }
        }
    }
}

/// Stream the events of the device at `path` into `queue` until the session is cancelled or
/// the device fails.
///
/// `queue` is dropped (and thus closed) when this returns.
pub(crate) async fn watch_device(
    path: PathBuf,
    queue: mpsc::Sender<InputEvent>,
    mut cancel: CancelToken,
) -> CloseReason {
    tracing::debug!(path = %path.display(), "Monitoring device");

    let mut device = match EventDevice::open(&path) {
        Ok(device) => device,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to open device");
            return CloseReason::OpenFailed(e);
        }
    };

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = device.next_event() => match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Error reading from device");
                    return CloseReason::ReadFailed(e);
                }
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = queue.send(event) => {
                if res.is_err() {
                    tracing::debug!(path = %path.display(), "Event queue dropped, stopping");
                    return CloseReason::Disconnected;
                }
            }
        }
    }

    tracing::debug!(path = %path.display(), "Monitoring cancelled");

    CloseReason::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTime;
    use crate::test_util::TestDir;

    #[tokio::test]
    async fn missing_device_fails_to_open() {
        let err = EventDevice::open(Path::new("/nonexistent/event0")).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn regular_files_are_not_pollable() {
        let dir = TestDir::new();
        let path = dir.path().join("event0");
        std::fs::write(&path, InputEvent { time: EventTime::default(), ty: 1, code: 2, value: 3 }.encode())
            .unwrap();

        assert!(EventDevice::open(&path).is_err());
    }

    #[test]
    fn errors_are_distinguished_from_requests() {
        assert!(CloseReason::OpenFailed(io::ErrorKind::NotFound.into()).is_error());
        assert!(CloseReason::ReadFailed(io::ErrorKind::UnexpectedEof.into()).is_error());
        assert!(CloseReason::Aborted.is_error());
        assert!(!CloseReason::Cancelled.is_error());
        assert!(!CloseReason::Disconnected.is_error());
    }
}
