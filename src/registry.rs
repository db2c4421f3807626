//! Enumeration of the input devices listed in `/proc/bus/input/devices`.
//!
//! The listing is made of blocks separated by blank lines, one block per device. Each line
//! of a block starts with a letter identifying the field it describes:
//!
//! ```text
//! I: Bus=0003 Vendor=1234 Product=5678 Version=0100
//! N: Name="Test KB"
//! P: Phys=usb-0000:00:14.0-1/input0
//! S: Sysfs=/devices/pci0000:00/0000:00:14.0/usb1/1-1/1-1:1.0/input/input3
//! U: Uniq=
//! H: Handlers=sysrq kbd event3
//! B: PROP=0
//! B: EV=120013
//! ```

use crate::InputWatchResult;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::Dispatch;

/// The kernel's listing of input devices.
pub const DEVICE_LISTING: &str = "/proc/bus/input/devices";
/// The directory holding the event device nodes.
pub const INPUT_DIR: &str = "/dev/input";

/// The prefix of the handler naming the event device node of an input device.
const EVENT_NODE_PREFIX: &str = "event";

/// An input device, as described by one block of the device listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputDevice {
    pub bus: String,
    pub vendor: String,
    pub product: String,
    pub version: String,
    /// The raw `Name=` value, including the surrounding quotes.
    pub name: String,
    pub phys: String,
    pub sysfs: String,
    pub uniq: String,
    /// The raw, space separated `Handlers=` value.
    pub handlers: String,
    /// The `B:` bitmask lines, keyed by the name on the left of the `=`.
    pub properties: BTreeMap<String, String>,
    input_dir: PathBuf,
}

impl InputDevice {
    /// The name of the event device node (e.g. `event3`), if the device has one.
    pub fn event_node(&self) -> Option<&str> {
        self.handlers
            .split_whitespace()
            .find(|h| h.starts_with(EVENT_NODE_PREFIX))
    }

    /// The path of the event device node (e.g. `/dev/input/event3`).
    ///
    /// This is empty if the device has no event handler, in which case any attempt to open
    /// it fails.
    pub fn input_path(&self) -> PathBuf {
        match self.event_node() {
            Some(node) if self.input_dir.as_os_str().is_empty() => Path::new(INPUT_DIR).join(node),
            Some(node) => self.input_dir.join(node),
            None => PathBuf::new(),
        }
    }

    /// Resolve the event node relative to `input_dir` instead of `/dev/input`.
    pub fn with_input_dir(mut self, input_dir: impl Into<PathBuf>) -> Self {
        self.input_dir = input_dir.into();
        self
    }

    /// The device name without the quotes the kernel puts around it.
    pub fn display_name(&self) -> &str {
        self.name.trim_matches('"')
    }

    /// Look up a `B:` bitmask line (e.g. `EV` or `KEY`).
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    fn is_empty(&self) -> bool {
        *self == Self {
            input_dir: self.input_dir.clone(),
            ..Self::default()
        }
    }

    fn apply_line(&mut self, line: &str) -> bool {
        let Some((tag, rest)) = line.split_once(':') else {
            return false;
        };
        let rest = rest.trim_start();

        match tag {
            "I" => self.apply_ids(rest),
            "N" => set_prefixed(&mut self.name, rest, "Name="),
            "P" => set_prefixed(&mut self.phys, rest, "Phys="),
            "S" => set_prefixed(&mut self.sysfs, rest, "Sysfs="),
            "U" => set_prefixed(&mut self.uniq, rest, "Uniq="),
            "H" => set_prefixed(&mut self.handlers, rest, "Handlers="),
            "B" => match rest.split_once('=') {
                Some((key, value)) => {
                    self.properties
                        .insert(key.trim().to_owned(), value.trim().to_owned());
                    true
                }
                None => false,
            },
            // Other tags are not errors, there is simply nothing to record.
            _ => true,
        }
    }

    fn apply_ids(&mut self, ids: &str) -> bool {
        let mut ok = true;

        for token in ids.split_whitespace() {
            let field = match token.split_once('=') {
                Some(("Bus", v)) => Some((&mut self.bus, v)),
                Some(("Vendor", v)) => Some((&mut self.vendor, v)),
                Some(("Product", v)) => Some((&mut self.product, v)),
                Some(("Version", v)) => Some((&mut self.version, v)),
                _ => None,
            };

            match field {
                Some((field, value)) => *field = value.to_owned(),
                None => ok = false,
            }
        }

        ok
    }
}

fn set_prefixed(field: &mut String, rest: &str, prefix: &str) -> bool {
    match rest.strip_prefix(prefix) {
        Some(value) => {
            *field = value.to_owned();
            true
        }
        None => false,
    }
}

/// Parse a device listing.
///
/// Lines that cannot be parsed are skipped, leaving the corresponding fields empty. The
/// end of the input terminates the last block even if no blank line follows it.
pub fn parse_devices(listing: impl BufRead) -> InputWatchResult<Vec<InputDevice>> {
    parse_listing(listing, Path::new(INPUT_DIR), &Dispatch::none())
}

fn parse_listing(
    listing: impl BufRead,
    input_dir: &Path,
    dispatch: &Dispatch,
) -> InputWatchResult<Vec<InputDevice>> {
    let blank = || InputDevice {
        input_dir: input_dir.to_owned(),
        ..InputDevice::default()
    };
    let mut devices = vec![];
    let mut current = blank();

    // Device names come from USB/HID descriptors and are not always valid UTF-8.
    for line in listing.split(b'\n') {
        let raw = line?;
        let line = String::from_utf8_lossy(raw.strip_suffix(b"\r").unwrap_or(&raw[..]));

        if line.trim().is_empty() {
            if !current.is_empty() {
                devices.push(std::mem::replace(&mut current, blank()));
            }
            continue;
        }

        if !current.apply_line(&line) {
            tracing::dispatcher::with_default(dispatch, || {
                tracing::trace!(line = %line, "Skipping malformed device listing line");
            });
        }
    }

    if !current.is_empty() {
        devices.push(current);
    }

    Ok(devices)
}

/// Reads the kernel's device listing.
#[derive(Debug, Clone)]
pub struct Registry {
    listing: PathBuf,
    input_dir: PathBuf,
    dispatch: Dispatch,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEVICE_LISTING)
    }
}

impl Registry {
    /// Create a `Registry` reading the listing at `listing`.
    pub fn new(listing: impl Into<PathBuf>) -> Self {
        Self {
            listing: listing.into(),
            input_dir: PathBuf::from(INPUT_DIR),
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Resolve event nodes relative to `input_dir` instead of `/dev/input`.
    pub fn with_input_dir(mut self, input_dir: impl Into<PathBuf>) -> Self {
        self.input_dir = input_dir.into();
        self
    }

    /// Send diagnostics to `dispatch`.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn listing(&self) -> &Path {
        &self.listing
    }

    /// List the input devices currently known to the kernel.
    ///
    /// Finding no device is not an error.
    pub fn enumerate(&self) -> InputWatchResult<Vec<InputDevice>> {
        let file = File::open(&self.listing).map_err(|e| {
            tracing::dispatcher::with_default(&self.dispatch, || {
                tracing::warn!(listing = %self.listing.display(), error = %e, "Failed to open device listing");
            });
            e
        })?;

        let devices = parse_listing(BufReader::new(file), &self.input_dir, &self.dispatch)?;

        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::debug!(count = devices.len(), "Enumerated input devices");
        });

        Ok(devices)
    }
}

/// List the input devices found in `/proc/bus/input/devices`.
pub fn enumerate_devices() -> InputWatchResult<Vec<InputDevice>> {
    Registry::default().enumerate()
}
