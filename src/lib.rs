//! This crate discovers the input devices of a Linux system and streams their raw events.
//!
//! The devices listed by the kernel can be enumerated with [`enumerate_devices`], and the
//! keyboards among them detected with [`is_keyboard`]. A [`Session`] streams the events of
//! several devices concurrently, each into its own [`EventQueue`], until it is cancelled.
//!
//! # Example
//!
//! A simple example that prints the events of every keyboard to stdout. Note the devices are
//! usually only readable by root.
//!
//! ```no_run
//! use futures::{future, StreamExt};
//! use inputwatch::{find_keyboards, monitor_all, InputWatchError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), InputWatchError> {
//!     let mut session = monitor_all(Some(find_keyboards()?))?;
//!     let queues = session.take_queues().into_iter().map(|(path, mut queue)| async move {
//!         while let Some(ev) = queue.next().await {
//!             println!("[{}]: ev={ev:?}", path.display());
//!         }
//!     });
//!
//!     future::join_all(queues).await;
//!     session.shutdown().await;
//!
//!     Ok(())
//! }
//! ```

#[cfg(not(target_os = "linux"))]
compile_error!("This crate only works on Linux");

mod error;
mod event;
mod keyboard;
mod monitor;
mod registry;
#[cfg(test)]
mod test_util;

pub use error::InputWatchError;
pub use event::{EventTime, InputEvent, EVENT_SIZE};
pub use keyboard::{
    event_codes, find_keyboards, is_keyboard, Bitmap, CapabilityQuery, EvdevQuery, KeyboardProbe,
};
pub use monitor::{
    monitor, monitor_all, monitor_path, CancelHandle, CloseReason, EventQueue, Monitor,
    MonitorBuilder, MonitorConfig, Session, WorkerReport, DEFAULT_QUEUE_CAPACITY,
};
pub use registry::{enumerate_devices, parse_devices, InputDevice, Registry, DEVICE_LISTING, INPUT_DIR};

pub type InputWatchResult<T> = Result<T, InputWatchError>;
