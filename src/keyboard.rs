//! Keyboard detection based on the capabilities advertised by an input device.

mod device;
pub mod event_codes;

use crate::registry::{InputDevice, Registry};
use crate::InputWatchResult;
use event_codes::{EV_KEY, EV_MAX, KEY_A, KEY_ENTER, KEY_ESC, KEY_MAX, KEY_MAX_LEGACY};
use std::fmt;
use std::fs::File;
use std::io;
use std::sync::Arc;
use tracing::Dispatch;

pub use device::Bitmap;

/// How the capabilities of an open input device are queried.
///
/// The request codes and the size of the key range differ between kernel versions, so the
/// query is pluggable.
pub trait CapabilityQuery: fmt::Debug + Send + Sync {
    /// The bitmap of supported event types (`EV_*`).
    fn event_types(&self, device: &File) -> io::Result<Bitmap>;

    /// The bitmap of supported key codes (`KEY_*`, `BTN_*`).
    fn key_codes(&self, device: &File) -> io::Result<Bitmap>;

    /// The key codes that identify a keyboard. Any one of them is enough.
    fn probe_keys(&self) -> &[u16];
}

/// Queries capabilities with the `EVIOCGBIT` ioctl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvdevQuery {
    key_max: u16,
    probe_keys: Vec<u16>,
}

impl EvdevQuery {
    /// The key range of current kernels (`KEY_MAX = 0x2ff`).
    pub fn current() -> Self {
        Self {
            key_max: KEY_MAX,
            probe_keys: vec![KEY_A, KEY_ENTER, KEY_ESC],
        }
    }

    /// The key range of kernels older than 2.6.28 (`KEY_MAX = 0x1ff`).
    pub fn legacy() -> Self {
        Self {
            key_max: KEY_MAX_LEGACY,
            ..Self::current()
        }
    }

    /// Replace the default probe keys (`KEY_A`, `KEY_ENTER`, `KEY_ESC`).
    pub fn with_probe_keys(mut self, keys: impl IntoIterator<Item = u16>) -> Self {
        self.probe_keys = keys.into_iter().collect();
        self
    }
}

impl Default for EvdevQuery {
    fn default() -> Self {
        Self::current()
    }
}

impl CapabilityQuery for EvdevQuery {
    fn event_types(&self, device: &File) -> io::Result<Bitmap> {
        device::read_event_bits(device, 0, EV_MAX)
    }

    fn key_codes(&self, device: &File) -> io::Result<Bitmap> {
        device::read_event_bits(device, EV_KEY, self.key_max)
    }

    fn probe_keys(&self) -> &[u16] {
        &self.probe_keys
    }
}

/// Decides whether an input device is a keyboard.
///
/// A device is considered a keyboard if it emits `EV_KEY` events and has at least one of the
/// probe keys. This is a heuristic: a keypad without any of the probe keys is not detected.
#[derive(Debug, Clone)]
pub struct KeyboardProbe {
    query: Arc<dyn CapabilityQuery>,
    dispatch: Dispatch,
}

impl Default for KeyboardProbe {
    fn default() -> Self {
        Self::new(EvdevQuery::current())
    }
}

impl KeyboardProbe {
    pub fn new(query: impl CapabilityQuery + 'static) -> Self {
        Self {
            query: Arc::new(query),
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Send diagnostics to `dispatch`.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Check whether `device` is a keyboard.
    ///
    /// Any failure (the device can't be opened, the ioctl is not supported, etc) is logged
    /// and reported as "not a keyboard".
    pub fn is_keyboard(&self, device: &InputDevice) -> bool {
        let path = device.input_path();

        tracing::dispatcher::with_default(&self.dispatch, || match self.probe(device) {
            Ok(is_kb) => {
                tracing::debug!(path = %path.display(), keyboard = is_kb, "Probed device");
                is_kb
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to probe device");
                false
            }
        })
    }

    /// Keep only the keyboards among `devices`.
    pub fn keyboards(&self, devices: impl IntoIterator<Item = InputDevice>) -> Vec<InputDevice> {
        devices
            .into_iter()
            .filter(|dev| self.is_keyboard(dev))
            .collect()
    }

    fn probe(&self, device: &InputDevice) -> io::Result<bool> {
        let file = File::open(device.input_path())?;

        if !self.query.event_types(&file)?.contains(EV_KEY) {
            return Ok(false);
        }

        let keys = self.query.key_codes(&file)?;

        Ok(self.query.probe_keys().iter().any(|&k| keys.contains(k)))
    }
}

/// Check whether `device` is a keyboard, using the capability query of current kernels.
pub fn is_keyboard(device: &InputDevice) -> bool {
    KeyboardProbe::default().is_keyboard(device)
}

/// Auto-detect the keyboard devices.
pub fn find_keyboards() -> InputWatchResult<Vec<InputDevice>> {
    Ok(KeyboardProbe::default().keyboards(Registry::default().enumerate()?))
}
