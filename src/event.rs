use crate::error::InputWatchError;
use crate::InputWatchResult;
use chrono::{DateTime, Utc};
use std::mem;

/// Width of each half of the kernel's `struct timeval`.
const TIME_FIELD_LEN: usize = mem::size_of::<libc::time_t>();

const SEC_OFFSET: usize = 0;
const USEC_OFFSET: usize = TIME_FIELD_LEN;
const TYPE_OFFSET: usize = 2 * TIME_FIELD_LEN;
const CODE_OFFSET: usize = TYPE_OFFSET + 2;
const VALUE_OFFSET: usize = CODE_OFFSET + 2;

/// The size in bytes of one `struct input_event` as written by the kernel.
pub const EVENT_SIZE: usize = VALUE_OFFSET + 4;

// The layout above must agree with the C definition.
const _: () = assert!(EVENT_SIZE == mem::size_of::<libc::input_event>());

/// The kernel timestamp of an event (`struct timeval`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventTime {
    pub sec: i64,
    pub usec: i64,
}

/// One raw input event, decoded from the device file.
///
/// No meaning is attached to `ty`, `code` or `value`: they are passed through exactly as
/// the kernel reported them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputEvent {
    pub time: EventTime,
    pub ty: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    /// Decode one event record from `buf`, using the host's native byte order and
    /// integer widths.
    ///
    /// Only the first [`EVENT_SIZE`] bytes are read.
    pub fn decode(buf: &[u8]) -> InputWatchResult<Self> {
        if buf.len() < EVENT_SIZE {
            return Err(InputWatchError::TruncatedEvent {
                expected: EVENT_SIZE,
                actual: buf.len(),
            });
        }

        Ok(Self {
            time: EventTime {
                sec: read_time_field(&buf[SEC_OFFSET..USEC_OFFSET]),
                usec: read_time_field(&buf[USEC_OFFSET..TYPE_OFFSET]),
            },
            ty: u16::from_ne_bytes([buf[TYPE_OFFSET], buf[TYPE_OFFSET + 1]]),
            code: u16::from_ne_bytes([buf[CODE_OFFSET], buf[CODE_OFFSET + 1]]),
            value: i32::from_ne_bytes([
                buf[VALUE_OFFSET],
                buf[VALUE_OFFSET + 1],
                buf[VALUE_OFFSET + 2],
                buf[VALUE_OFFSET + 3],
            ]),
        })
    }

    /// Encode the event in the same layout the kernel uses.
    ///
    /// On targets with a 32-bit `time_t` the timestamp fields are truncated.
    pub fn encode(&self) -> [u8; EVENT_SIZE] {
        let mut buf = [0u8; EVENT_SIZE];

        write_time_field(&mut buf[SEC_OFFSET..USEC_OFFSET], self.time.sec);
        write_time_field(&mut buf[USEC_OFFSET..TYPE_OFFSET], self.time.usec);
        buf[TYPE_OFFSET..CODE_OFFSET].copy_from_slice(&self.ty.to_ne_bytes());
        buf[CODE_OFFSET..VALUE_OFFSET].copy_from_slice(&self.code.to_ne_bytes());
        buf[VALUE_OFFSET..EVENT_SIZE].copy_from_slice(&self.value.to_ne_bytes());

        buf
    }

    /// The wall-clock time of the event, or `None` if the kernel timestamp is out of range.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let nsec = u32::try_from(self.time.usec.checked_mul(1000)?).ok()?;

        DateTime::from_timestamp(self.time.sec, nsec)
    }
}

fn read_time_field(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; TIME_FIELD_LEN];
    raw.copy_from_slice(bytes);

    i64::from(libc::time_t::from_ne_bytes(raw))
}

fn write_time_field(bytes: &mut [u8], value: i64) {
    bytes.copy_from_slice(&(value as libc::time_t).to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InputEvent {
        InputEvent {
            time: EventTime {
                sec: 1_665_000_000,
                usec: 250_000,
            },
            ty: 1,
            code: 30,
            value: 1,
        }
    }

    #[test]
    fn event_size_matches_kernel_struct() {
        assert_eq!(EVENT_SIZE, mem::size_of::<libc::input_event>());
    }

    #[test]
    fn decode_reads_fields_at_native_offsets() {
        let mut buf = vec![0u8; EVENT_SIZE];
        buf[TYPE_OFFSET..CODE_OFFSET].copy_from_slice(&4u16.to_ne_bytes());
        buf[CODE_OFFSET..VALUE_OFFSET].copy_from_slice(&0x1cu16.to_ne_bytes());
        buf[VALUE_OFFSET..].copy_from_slice(&(-7i32).to_ne_bytes());
        buf[SEC_OFFSET..USEC_OFFSET].copy_from_slice(&(42 as libc::time_t).to_ne_bytes());
        buf[USEC_OFFSET..TYPE_OFFSET].copy_from_slice(&(999_999 as libc::time_t).to_ne_bytes());

        let ev = InputEvent::decode(&buf).unwrap();

        assert_eq!(ev.time, EventTime { sec: 42, usec: 999_999 });
        assert_eq!(ev.ty, 4);
        assert_eq!(ev.code, 0x1c);
        assert_eq!(ev.value, -7);
    }

    #[test]
    fn decode_matches_libc_layout() {
        let raw = libc::input_event {
            time: libc::timeval {
                tv_sec: 7,
                tv_usec: 11,
            },
            type_: 3,
            code: 0x35,
            value: i32::MIN,
        };
        let bytes = unsafe {
            std::slice::from_raw_parts(&raw as *const libc::input_event as *const u8, EVENT_SIZE)
        };

        let ev = InputEvent::decode(bytes).unwrap();

        assert_eq!(ev.time, EventTime { sec: 7, usec: 11 });
        assert_eq!(ev.ty, 3);
        assert_eq!(ev.code, 0x35);
        assert_eq!(ev.value, i32::MIN);
    }

    #[test]
    fn encoded_event_decodes_to_itself() {
        for (ty, code, value) in [(0, 0, 0), (u16::MAX, u16::MAX, i32::MAX), (2, 8, -1)] {
            let ev = InputEvent { ty, code, value, ..sample() };

            assert_eq!(InputEvent::decode(&ev.encode()).unwrap(), ev);
        }
    }

    #[test]
    fn decode_rejects_short_buffers() {
        let err = InputEvent::decode(&[0u8; EVENT_SIZE - 1]).unwrap_err();

        assert!(matches!(
            err,
            InputWatchError::TruncatedEvent { expected: EVENT_SIZE, actual } if actual == EVENT_SIZE - 1
        ));
    }

    #[test]
    fn timestamp_converts_microseconds() {
        let ts = sample().timestamp().unwrap();

        assert_eq!(ts.timestamp(), 1_665_000_000);
        assert_eq!(ts.timestamp_subsec_micros(), 250_000);
    }

    #[test]
    fn timestamp_rejects_out_of_range_microseconds() {
        let mut ev = sample();
        ev.time.usec = -1;

        assert_eq!(ev.timestamp(), None);
    }
}
