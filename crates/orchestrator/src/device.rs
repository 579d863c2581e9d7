//! A named device: one driver handle, its configured actions and the worker
//! tasks it spawned for long-running operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use robotinterface_core::{Action, Param, ParamList};
use tracing::{debug, info, warn};

use crate::driver::{DriverHandle, DriverList, DriverResult};
use crate::error::DeviceError;

/// Long-running operations that execute on a device worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Calibrate,
    Park,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calibrate => "calibrate",
            Self::Park => "park",
        }
    }
}

/// Driver result of a worker, or why its task was lost.
type WorkerResult = std::result::Result<DriverResult, String>;

#[derive(Clone)]
struct Worker {
    id: u64,
    kind: WorkerKind,
    target: String,
    done: Shared<BoxFuture<'static, WorkerResult>>,
}

/// Workers still executing, per kind.
///
/// Counted by the worker tasks themselves: a worker that finished but was
/// not joined yet is no longer asked to stop.
#[derive(Default)]
struct Running {
    calibrate: AtomicUsize,
    park: AtomicUsize,
}

impl Running {
    fn counter(&self, kind: WorkerKind) -> &AtomicUsize {
        match kind {
            WorkerKind::Calibrate => &self.calibrate,
            WorkerKind::Park => &self.park,
        }
    }

    fn is_running(&self, kind: WorkerKind) -> bool {
        self.counter(kind).load(Ordering::SeqCst) > 0
    }
}

/// Decrements the running count when the worker task ends, panics included.
struct RunningGuard {
    running: Arc<Running>,
    kind: WorkerKind,
}

impl RunningGuard {
    fn start(running: Arc<Running>, kind: WorkerKind) -> Self {
        running.counter(kind).fetch_add(1, Ordering::SeqCst);
        Self { running, kind }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.counter(self.kind).fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of one joined worker.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub device: String,
    pub kind: WorkerKind,
    pub target: String,
    pub result: Result<(), DeviceError>,
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Wrapper around one driver handle.
///
/// Devices are shared between lists as `Arc<Device>`; the driver itself is
/// never duplicated. Closing a device that is not open does not reach the
/// driver, so a device listed twice is still closed once.
pub struct Device {
    name: String,
    driver: DriverHandle,
    params: RwLock<ParamList>,
    actions: Vec<Action>,
    open: AtomicBool,
    workers: Mutex<Vec<Worker>>,
    next_worker: AtomicU64,
    running: Arc<Running>,
}

impl Device {
    pub fn new(name: impl Into<String>, driver: DriverHandle) -> Self {
        Self {
            name: name.into(),
            driver,
            params: RwLock::new(ParamList::new()),
            actions: Vec::new(),
            open: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            next_worker: AtomicU64::new(0),
            running: Arc::new(Running::default()),
        }
    }

    pub fn with_params(self, params: ParamList) -> Self {
        *self.params.write().unwrap_or_else(PoisonError::into_inner) = params;
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &DriverHandle {
        &self.driver
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Snapshot of the device parameters.
    pub fn params(&self) -> ParamList {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .has_param(name)
    }

    /// Append `name = value` unless a parameter with that name exists.
    /// Returns whether the parameter was added.
    pub fn push_param_if_absent(&self, name: &str, value: &str) -> bool {
        let mut params = self.params.write().unwrap_or_else(PoisonError::into_inner);
        if params.has_param(name) {
            return false;
        }
        params.push(Param::new(name, value));
        true
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub async fn open(&self) -> Result<(), DeviceError> {
        if self.is_open() {
            debug!(device = %self.name, "Device is already open");
            return Ok(());
        }

        let params = self.params();
        self.driver
            .open(&params)
            .await
            .map_err(|e| DeviceError::driver(&self.name, "open", e))?;
        self.open.store(true, Ordering::SeqCst);

        info!(device = %self.name, "Device opened");
        Ok(())
    }

    pub async fn close(&self) -> Result<(), DeviceError> {
        if !self.is_open() {
            return Ok(());
        }

        self.driver
            .close()
            .await
            .map_err(|e| DeviceError::driver(&self.name, "close", e))?;
        self.open.store(false, Ordering::SeqCst);

        info!(device = %self.name, "Device closed");
        Ok(())
    }

    pub async fn attach(&self, drivers: &DriverList) -> Result<(), DeviceError> {
        self.ensure_open()?;
        debug!(device = %self.name, drivers = ?drivers, "Attaching device");
        self.driver
            .attach(drivers)
            .await
            .map_err(|e| DeviceError::driver(&self.name, "attach", e))
    }

    pub async fn detach(&self) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.driver
            .detach()
            .await
            .map_err(|e| DeviceError::driver(&self.name, "detach", e))
    }

    /// Start calibrating `target` on a worker of this device.
    ///
    /// Returns once the worker is running; its outcome is collected by
    /// [`join_threads`](Self::join_threads).
    pub fn calibrate(&self, target: &Device) -> Result<(), DeviceError> {
        self.spawn_worker(WorkerKind::Calibrate, target)
    }

    /// Start parking `target` on a worker of this device.
    pub fn park(&self, target: &Device) -> Result<(), DeviceError> {
        self.spawn_worker(WorkerKind::Park, target)
    }

    fn spawn_worker(&self, kind: WorkerKind, target: &Device) -> Result<(), DeviceError> {
        self.ensure_open()?;
        target.ensure_open()?;

        let driver = self.driver.clone();
        let target_driver = target.driver.clone();
        let guard = RunningGuard::start(self.running.clone(), kind);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            match kind {
                WorkerKind::Calibrate => driver.calibrate(&target_driver).await,
                WorkerKind::Park => driver.park(&target_driver).await,
            }
        });
        let done = async move { handle.await.map_err(|e| e.to_string()) }
            .boxed()
            .shared();

        debug!(
            device = %self.name,
            target = %target.name,
            operation = kind.as_str(),
            "Worker started"
        );

        self.lock_workers().push(Worker {
            id: self.next_worker.fetch_add(1, Ordering::SeqCst),
            kind,
            target: target.name.clone(),
            done,
        });
        Ok(())
    }

    /// Number of workers registered and not yet joined.
    pub fn pending_threads(&self) -> usize {
        self.lock_workers().len()
    }

    /// Ask every running worker to stop.
    ///
    /// This only forwards a quit request to the driver; workers are never
    /// aborted and still have to be joined.
    pub async fn stop_threads(&self) {
        for kind in [WorkerKind::Calibrate, WorkerKind::Park] {
            if !self.running.is_running(kind) {
                continue;
            }

            let result = match kind {
                WorkerKind::Calibrate => self.driver.quit_calibrate().await,
                WorkerKind::Park => self.driver.quit_park().await,
            };
            if let Err(e) = result {
                warn!(
                    device = %self.name,
                    operation = kind.as_str(),
                    error = %e,
                    "Failed to stop worker"
                );
            }
        }
    }

    /// Wait for every registered worker and return their outcomes in
    /// registration order.
    ///
    /// Workers stay registered until they finish, so concurrent callers all
    /// wait on the same workers and each gets their outcomes.
    pub async fn join_threads(&self) -> Vec<WorkerOutcome> {
        let workers = self.lock_workers().clone();
        if workers.is_empty() {
            return Vec::new();
        }

        let results = join_all(workers.iter().map(|w| w.done.clone())).await;
        self.lock_workers()
            .retain(|w| !workers.iter().any(|joined| joined.id == w.id));

        workers
            .into_iter()
            .zip(results)
            .map(|(worker, joined)| {
                let kind = worker.kind;
                let result = match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(DeviceError::driver(&self.name, kind.as_str(), e)),
                    Err(reason) => Err(DeviceError::WorkerLost {
                        device: self.name.clone(),
                        operation: kind.as_str(),
                        reason,
                    }),
                };
                WorkerOutcome {
                    device: self.name.clone(),
                    kind,
                    target: worker.target,
                    result,
                }
            })
            .collect()
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DeviceError::NotOpen(self.name.clone()))
        }
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<Worker>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .field("actions", &self.actions.len())
            .field("pending_threads", &self.pending_threads())
            .finish()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(name = \"{}\"", self.name)?;
        let params = self.params();
        if !params.is_empty() {
            write!(f, ", params = [{}]", params)?;
        }
        if !self.actions.is_empty() {
            write!(f, ", actions = [")?;
            for (i, action) in self.actions.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", action)?;
            }
            write!(f, "]")?;
        }
        write!(f, ")")
    }
}
