#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orchestrator::{Device, Driver, DriverError, DriverHandle, DriverList, DriverResult};
use robotinterface_core::ParamList;
use tokio::sync::Notify;

/// Ordered log of driver calls shared by every driver of a test.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// Driver that records every call into a [`Trace`].
///
/// A blocking calibrate only returns once `quit_calibrate` is called.
pub struct RecordingDriver {
    name: String,
    trace: Trace,
    pub fail_open: bool,
    pub fail_close: bool,
    pub fail_attach: bool,
    pub block_calibrate: bool,
    pub calibrating: Notify,
    release: Notify,
}

impl RecordingDriver {
    pub fn new(name: &str, trace: &Trace) -> Self {
        Self {
            name: name.to_string(),
            trace: trace.clone(),
            fail_open: false,
            fail_close: false,
            fail_attach: false,
            block_calibrate: false,
            calibrating: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn failing_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    pub fn blocking_calibrate(mut self) -> Self {
        self.block_calibrate = true;
        self
    }

    fn fail_if(&self, fail: bool, operation: &str) -> DriverResult {
        if fail {
            Err(DriverError::failed(format!("{} refused {}", self.name, operation)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    async fn open(&self, params: &ParamList) -> DriverResult {
        self.trace.record(format!("open:{}", self.name));
        if let Some(verbose) = params.find_param("verbose") {
            self.trace.record(format!("verbose:{}={}", self.name, verbose));
        }
        self.fail_if(self.fail_open, "open")
    }

    async fn close(&self) -> DriverResult {
        self.trace.record(format!("close:{}", self.name));
        self.fail_if(self.fail_close, "close")
    }

    async fn attach(&self, drivers: &DriverList) -> DriverResult {
        let entries: Vec<String> = drivers
            .iter()
            .map(|e| format!("{}={}", e.key(), e.device()))
            .collect();
        self.trace
            .record(format!("attach:{}:{}", self.name, entries.join(",")));
        self.fail_if(self.fail_attach, "attach")
    }

    async fn detach(&self) -> DriverResult {
        self.trace.record(format!("detach:{}", self.name));
        Ok(())
    }

    async fn calibrate(&self, _target: &DriverHandle) -> DriverResult {
        self.trace.record(format!("calibrate:{}", self.name));
        if self.block_calibrate {
            self.calibrating.notify_one();
            self.release.notified().await;
            self.trace.record(format!("calibrate-stopped:{}", self.name));
        }
        Ok(())
    }

    async fn park(&self, _target: &DriverHandle) -> DriverResult {
        self.trace.record(format!("park:{}", self.name));
        Ok(())
    }

    async fn quit_calibrate(&self) -> DriverResult {
        self.trace.record(format!("quit-calibrate:{}", self.name));
        self.release.notify_one();
        Ok(())
    }
}

pub fn device(name: &str, trace: &Trace) -> Device {
    Device::new(name, Arc::new(RecordingDriver::new(name, trace)))
}

pub fn device_with(name: &str, driver: RecordingDriver) -> Device {
    Device::new(name, Arc::new(driver))
}
