//! Concurrent monitoring of input devices.
//!
//! Every monitored device is served by its own task, which reads the events of the device
//! and publishes them to a bounded queue. All the tasks of a [`Session`] share a single
//! cancellation signal.

mod worker;

pub use worker::CloseReason;

use crate::error::InputWatchError;
use crate::event::InputEvent;
use crate::registry::{InputDevice, Registry, DEVICE_LISTING, INPUT_DIR};
use crate::InputWatchResult;
use futures::future::join_all;
use futures::Stream;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

/// The default number of events a queue can hold before its worker stops reading.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Requests the shutdown of all the workers of a [`Session`].
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);

        (Self(Arc::new(tx)), CancelToken(rx))
    }

    /// Ask every worker to stop. Calling this more than once has no further effect.
    ///
    /// Workers blocked on a read or on a full queue are woken up, so they stop promptly.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// The worker side of a [`CancelHandle`].
#[derive(Debug, Clone)]
pub(crate) struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
    /// Resolves once cancellation has been requested.
    pub(crate) async fn cancelled(&mut self) {
        let closed = self.0.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            // Every handle is gone, so cancellation can never happen.
            futures::future::pending::<()>().await;
        }
    }
}

/// The events of one device, in the order they were read.
///
/// The queue is closed when its worker stops: a queue that closes without having yielded any
/// event usually means the device could not be opened.
#[derive(Debug)]
pub struct EventQueue {
    path: PathBuf,
    rx: mpsc::Receiver<InputEvent>,
}

impl EventQueue {
    /// The path of the device the events come from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Receive the next event, or `None` once the worker has stopped and the queue is drained.
    pub async fn recv(&mut self) -> Option<InputEvent> {
        self.rx.recv().await
    }

    /// Receive an event if one is ready.
    pub fn try_recv(&mut self) -> Result<InputEvent, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Stream for EventQueue {
    type Item = InputEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// The outcome of one worker.
#[derive(Debug)]
pub struct WorkerReport {
    pub path: PathBuf,
    pub reason: CloseReason,
}

/// A set of running workers, their queues and the cancellation handle they share.
///
/// Dropping a `Session` does not stop its workers: they keep running until they are
/// cancelled, fail, or their queue is dropped.
#[derive(Debug)]
pub struct Session {
    queues: HashMap<PathBuf, EventQueue>,
    cancel: CancelHandle,
    workers: Vec<(PathBuf, JoinHandle<CloseReason>)>,
    /// Devices without an event node, which were never started.
    skipped: Vec<WorkerReport>,
    dispatch: Dispatch,
}

impl Session {
    /// The paths of the monitored devices.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.workers.iter().map(|(path, _)| path.as_path())
    }

    /// The queue of the device at `path`, unless it was taken.
    pub fn queue(&mut self, path: impl AsRef<Path>) -> Option<&mut EventQueue> {
        self.queues.get_mut(path.as_ref())
    }

    /// Take ownership of the queue of the device at `path`.
    pub fn take_queue(&mut self, path: impl AsRef<Path>) -> Option<EventQueue> {
        self.queues.remove(path.as_ref())
    }

    /// Take ownership of all the remaining queues, keyed by device path.
    pub fn take_queues(&mut self) -> HashMap<PathBuf, EventQueue> {
        std::mem::take(&mut self.queues)
    }

    /// A handle that can cancel this session from anywhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Ask every worker to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until every worker has stopped.
    ///
    /// This does not cancel the workers: unless [`cancel`](Self::cancel) is called, it only
    /// returns once every device has failed or every queue has been dropped.
    pub async fn join(self) -> Vec<WorkerReport> {
        let Session {
            workers,
            skipped,
            dispatch,
            ..
        } = self;
        let (paths, handles): (Vec<_>, Vec<_>) = workers.into_iter().unzip();

        let mut reports: Vec<_> = paths
            .into_iter()
            .zip(join_all(handles).await)
            .map(|(path, res)| {
                let reason = res.unwrap_or_else(|e| {
                    tracing::dispatcher::with_default(&dispatch, || {
                        tracing::error!(path = %path.display(), error = %e, "Worker task failed");
                    });
                    CloseReason::Aborted
                });

                WorkerReport { path, reason }
            })
            .collect();

        reports.extend(skipped);
        reports
    }

    /// Cancel the session and wait for every worker to stop.
    pub async fn shutdown(self) -> Vec<WorkerReport> {
        self.cancel();
        self.join().await
    }
}

/// The settings of a [`Monitor`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// The device listing to enumerate devices from.
    pub listing: PathBuf,
    /// The directory holding the event device nodes.
    pub input_dir: PathBuf,
    /// The capacity of each event queue.
    pub queue_capacity: usize,
    /// Where diagnostics go.
    pub dispatch: Dispatch,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            listing: PathBuf::from(DEVICE_LISTING),
            input_dir: PathBuf::from(INPUT_DIR),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }
}

/// Builder for [`Monitor`].
#[derive(Debug, Clone, Default)]
pub struct MonitorBuilder {
    config: MonitorConfig,
}

impl MonitorBuilder {
    pub fn listing(mut self, listing: impl Into<PathBuf>) -> Self {
        self.config.listing = listing.into();
        self
    }

    pub fn input_dir(mut self, input_dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = input_dir.into();
        self
    }

    /// Set the capacity of the event queues. A capacity of 0 is raised to 1.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.config.dispatch = dispatch;
        self
    }

    pub fn build(self) -> Monitor {
        Monitor {
            config: self.config,
        }
    }
}

/// Starts monitoring sessions.
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    config: MonitorConfig,
}

impl Monitor {
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The registry devices are enumerated from when none are specified.
    pub fn registry(&self) -> Registry {
        Registry::new(&self.config.listing)
            .with_input_dir(&self.config.input_dir)
            .with_dispatch(self.config.dispatch.clone())
    }

    /// Monitor a single device.
    pub fn watch(&self, device: &InputDevice) -> InputWatchResult<Session> {
        self.spawn(vec![device.input_path()])
    }

    /// Monitor the device file at `path`.
    pub fn watch_path(&self, path: impl Into<PathBuf>) -> InputWatchResult<Session> {
        self.spawn(vec![path.into()])
    }

    /// Monitor several devices at once, or every device of the registry if `devices` is
    /// `None`.
    ///
    /// Nothing is spawned if the enumeration fails, or if two devices share the same path.
    /// Devices without an event node get no queue: they are reported by
    /// [`Session::join`] as [`CloseReason::OpenFailed`].
    pub fn watch_all(&self, devices: Option<Vec<InputDevice>>) -> InputWatchResult<Session> {
        let devices = match devices {
            Some(devices) => devices,
            None => self.registry().enumerate()?,
        };

        let mut seen = HashSet::new();
        let mut paths = Vec::with_capacity(devices.len());
        let mut skipped = vec![];

        for dev in &devices {
            if dev.event_node().is_none() {
                tracing::dispatcher::with_default(&self.config.dispatch, || {
                    tracing::warn!(name = %dev.display_name(), handlers = %dev.handlers, "Device has no event node");
                });
                skipped.push(WorkerReport {
                    path: PathBuf::new(),
                    reason: CloseReason::OpenFailed(io::Error::new(
                        io::ErrorKind::NotFound,
                        "device has no event handler",
                    )),
                });
                continue;
            }

            let path = dev.input_path();
            if !seen.insert(path.clone()) {
                return Err(InputWatchError::DuplicateDevicePath(path));
            }
            paths.push(path);
        }

        let mut session = self.spawn(paths)?;
        session.skipped = skipped;

        Ok(session)
    }

    fn spawn(&self, paths: Vec<PathBuf>) -> InputWatchResult<Session> {
        let runtime = Handle::try_current().map_err(|_| InputWatchError::NoRuntime)?;
        let dispatch = &self.config.dispatch;
        let (cancel, token) = CancelHandle::new();

        tracing::dispatcher::with_default(dispatch, || {
            tracing::info!(count = paths.len(), "Starting device monitoring");
        });

        let mut queues = HashMap::with_capacity(paths.len());
        let mut workers = Vec::with_capacity(paths.len());

        for path in paths {
            let (tx, rx) = mpsc::channel(self.config.queue_capacity);
            let worker = worker::watch_device(path.clone(), tx, token.clone())
                .with_subscriber(dispatch.clone());

            workers.push((path.clone(), runtime.spawn(worker)));
            queues.insert(path.clone(), EventQueue { path, rx });
        }

        Ok(Session {
            queues,
            cancel,
            workers,
            skipped: vec![],
            dispatch: dispatch.clone(),
        })
    }
}

/// Monitor a single device with the default settings.
pub fn monitor(device: &InputDevice) -> InputWatchResult<Session> {
    Monitor::default().watch(device)
}

/// Monitor the device file at `path` with the default settings.
pub fn monitor_path(path: impl Into<PathBuf>) -> InputWatchResult<Session> {
    Monitor::default().watch_path(path)
}

/// Monitor several devices, or every input device if `devices` is `None`.
pub fn monitor_all(devices: Option<Vec<InputDevice>>) -> InputWatchResult<Session> {
    Monitor::default().watch_all(devices)
}
