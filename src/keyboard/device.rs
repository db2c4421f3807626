use std::fs::File;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, RawFd};

const IOC_NRBITS: libc::c_ulong = 8;
const IOC_TYPEBITS: libc::c_ulong = 8;
const IOC_SIZEBITS: libc::c_ulong = 14;
const IOC_NRSHIFT: libc::c_ulong = 0;
const IOC_TYPESHIFT: libc::c_ulong = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: libc::c_ulong = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: libc::c_ulong = IOC_SIZESHIFT + IOC_SIZEBITS;
const IOC_READ: libc::c_ulong = 2;

const WORD_BITS: usize = libc::c_ulong::BITS as usize;

/// A capability bitmap, laid out the way the kernel fills it in (an array of `unsigned long`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap(Vec<libc::c_ulong>);

impl Bitmap {
    /// An all-zero bitmap large enough to hold bits `0..=max`.
    pub fn zeroed(max: u16) -> Self {
        Self(vec![0; usize::from(max) / WORD_BITS + 1])
    }

    /// A bitmap with exactly the specified bits set.
    pub fn from_bits(bits: impl IntoIterator<Item = u16>) -> Self {
        let mut map = Self::default();
        for bit in bits {
            map.set(bit);
        }
        map
    }

    pub fn set(&mut self, bit: u16) {
        let (word, mask) = locate(bit);
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= mask;
    }

    pub fn contains(&self, bit: u16) -> bool {
        let (word, mask) = locate(bit);
        self.0.get(word).map_or(false, |w| w & mask != 0)
    }

    fn byte_len(&self) -> usize {
        self.0.len() * mem::size_of::<libc::c_ulong>()
    }
}

fn locate(bit: u16) -> (usize, libc::c_ulong) {
    let bit = usize::from(bit);
    (bit / WORD_BITS, 1 << (bit % WORD_BITS))
}

/// Read the capability bitmap of event type `ev` (or the bitmap of supported event types if
/// `ev` is 0) using the `EVIOCGBIT` ioctl.
pub(crate) fn read_event_bits(f: &File, ev: u16, max: u16) -> io::Result<Bitmap> {
    let mut bits = Bitmap::zeroed(max);

    let eviocgbit = (IOC_READ << IOC_DIRSHIFT)
        | (('E' as libc::c_ulong) << IOC_TYPESHIFT)
        | ((0x20 + libc::c_ulong::from(ev)) << IOC_NRSHIFT)
        | ((bits.byte_len() as libc::c_ulong) << IOC_SIZESHIFT);

    ioctl(f.as_raw_fd(), eviocgbit, bits.0.as_mut_ptr())?;

    Ok(bits)
}

fn ioctl(fd: RawFd, request: libc::c_ulong, buf: *mut libc::c_ulong) -> io::Result<()> {
    let res = unsafe { libc::ioctl(fd, request as _, buf) };

    if res < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_bitmap_covers_max_bit() {
        let bits = Bitmap::zeroed(0x2ff);

        assert_eq!(bits.byte_len() * 8, (0x2ff / WORD_BITS + 1) * WORD_BITS);
        assert!(!bits.contains(0x2ff));
    }

    #[test]
    fn set_bits_are_found() {
        let bits = Bitmap::from_bits([1, 28, 30, 0x2ff]);

        for bit in [1, 28, 30, 0x2ff] {
            assert!(bits.contains(bit), "bit {bit}");
        }
        for bit in [0, 2, 29, 31, 0x2fe] {
            assert!(!bits.contains(bit), "bit {bit}");
        }
    }

    #[test]
    fn bits_beyond_the_map_are_unset() {
        assert!(!Bitmap::zeroed(7).contains(u16::MAX));
    }

    #[test]
    fn ioctl_on_regular_file_fails() {
        let f = File::open("/proc/self/status").unwrap();

        assert!(read_event_bits(&f, 0, 0x1f).is_err());
    }
}
