//! Simulated driver backend.
//!
//! Lets a description exercise every lifecycle path without hardware:
//! `fail_open`, `fail_close` and `fail_attach` make the matching operation
//! fail, `delay_ms` slows every operation down. Calibration and parking
//! keep running until the delay elapses or they are asked to quit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use orchestrator::{Driver, DriverError, DriverHandle, DriverList, DriverResult};
use robotinterface_core::ParamList;
use tokio::sync::Notify;
use tracing::{debug, info};

#[derive(Debug)]
pub struct SimDriver {
    name: String,
    fail_open: bool,
    fail_close: bool,
    fail_attach: bool,
    delay: Duration,
    quit_calibrate: QuitSignal,
    quit_park: QuitSignal,
}

/// Quit request that outlives the moment it was made.
///
/// A request issued before the running operation first waits on it still
/// stops that operation. The operation clears it when it ends.
#[derive(Debug, Default)]
struct QuitSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl QuitSignal {
    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.requested.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

impl SimDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_open: false,
            fail_close: false,
            fail_attach: false,
            delay: Duration::ZERO,
            quit_calibrate: QuitSignal::default(),
            quit_park: QuitSignal::default(),
        }
    }

    pub fn from_params(name: &str, params: &ParamList) -> Result<Self> {
        let delay_ms = match params.find_param("delay_ms") {
            Some(value) => value.parse::<u64>().with_context(|| {
                format!("Invalid delay_ms \"{}\" for device \"{}\"", value, name)
            })?,
            None => 0,
        };

        Ok(Self {
            fail_open: is_set(params, "fail_open"),
            fail_close: is_set(params, "fail_close"),
            fail_attach: is_set(params, "fail_attach"),
            delay: Duration::from_millis(delay_ms),
            ..Self::new(name)
        })
    }

    async fn simulate(&self, operation: &str, fail: bool) -> DriverResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if fail {
            return Err(DriverError::failed(format!(
                "simulated {} failure on {}",
                operation, self.name
            )));
        }
        debug!(driver = %self.name, operation, "Simulated operation done");
        Ok(())
    }

    async fn run_until_quit(&self, operation: &str, quit: &QuitSignal) -> DriverResult {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {
                debug!(driver = %self.name, operation, "Simulated operation done");
            }
            _ = quit.wait() => {
                info!(driver = %self.name, operation, "Simulated operation stopped");
            }
        }
        quit.clear();
        Ok(())
    }
}

fn is_set(params: &ParamList, name: &str) -> bool {
    matches!(params.find_param(name), Some("1" | "true"))
}

#[async_trait]
impl Driver for SimDriver {
    async fn open(&self, _params: &ParamList) -> DriverResult {
        self.simulate("open", self.fail_open).await
    }

    async fn close(&self) -> DriverResult {
        self.simulate("close", self.fail_close).await
    }

    async fn attach(&self, drivers: &DriverList) -> DriverResult {
        debug!(driver = %self.name, drivers = ?drivers, "Attaching");
        self.simulate("attach", self.fail_attach).await
    }

    async fn detach(&self) -> DriverResult {
        self.simulate("detach", false).await
    }

    async fn calibrate(&self, _target: &DriverHandle) -> DriverResult {
        self.run_until_quit("calibrate", &self.quit_calibrate).await
    }

    async fn park(&self, _target: &DriverHandle) -> DriverResult {
        self.run_until_quit("park", &self.quit_park).await
    }

    async fn quit_calibrate(&self) -> DriverResult {
        self.quit_calibrate.request();
        Ok(())
    }

    async fn quit_park(&self) -> DriverResult {
        self.quit_park.request();
        Ok(())
    }
}
