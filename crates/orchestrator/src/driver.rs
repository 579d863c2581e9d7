//! Contract between a [`Device`](crate::Device) and the backend that
//! actually talks to hardware.
//!
//! The orchestrator never looks inside a driver. It only calls the
//! operations below, through a shared [`DriverHandle`] so the same live
//! resource can appear in several device lists without being duplicated.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use robotinterface_core::ParamList;

use crate::error::DriverError;

pub type DriverResult = std::result::Result<(), DriverError>;

/// Shared, reference-counted handle to a live driver.
pub type DriverHandle = Arc<dyn Driver>;

/// Driver backend for one device.
///
/// Only `open` and `close` are mandatory. Optional capabilities report
/// [`DriverError::Unsupported`] unless overridden; the `quit_*` hooks are
/// stop requests for long-running calibrations and parks and succeed by
/// default.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn open(&self, params: &ParamList) -> DriverResult;

    async fn close(&self) -> DriverResult;

    /// Attach this driver to the given ones (wrapper-style devices).
    async fn attach(&self, _drivers: &DriverList) -> DriverResult {
        Err(DriverError::Unsupported("attach"))
    }

    async fn detach(&self) -> DriverResult {
        Err(DriverError::Unsupported("detach"))
    }

    /// Run a calibration of `target`, this driver being the calibrator.
    async fn calibrate(&self, _target: &DriverHandle) -> DriverResult {
        Err(DriverError::Unsupported("calibrate"))
    }

    /// Move `target` to its park position.
    async fn park(&self, _target: &DriverHandle) -> DriverResult {
        Err(DriverError::Unsupported("park"))
    }

    async fn quit_calibrate(&self) -> DriverResult {
        Ok(())
    }

    async fn quit_park(&self) -> DriverResult {
        Ok(())
    }
}

/// One driver in a [`DriverList`], tagged with the network it serves.
#[derive(Clone)]
pub struct DriverEntry {
    key: String,
    device: String,
    driver: DriverHandle,
}

impl DriverEntry {
    /// Network tag (`"all"` for attach-all).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name of the device owning the driver.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn driver(&self) -> &DriverHandle {
        &self.driver
    }
}

/// Ordered list of drivers handed to an attach operation.
#[derive(Clone, Default)]
pub struct DriverList {
    entries: Vec<DriverEntry>,
}

impl DriverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        key: impl Into<String>,
        device: impl Into<String>,
        driver: DriverHandle,
    ) {
        self.entries.push(DriverEntry {
            key: key.into(),
            device: device.into(),
            driver,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DriverEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn find(&self, key: &str) -> Option<&DriverEntry> {
        self.entries.iter().find(|e| e.key == key)
    }
}

impl fmt::Debug for DriverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.key, &e.device)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    #[async_trait]
    impl Driver for Bare {
        async fn open(&self, _params: &ParamList) -> DriverResult {
            Ok(())
        }

        async fn close(&self) -> DriverResult {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_optional_capabilities_default_to_unsupported() {
        let driver: DriverHandle = Arc::new(Bare);

        assert!(matches!(
            driver.attach(&DriverList::new()).await,
            Err(DriverError::Unsupported("attach"))
        ));
        assert!(matches!(
            driver.calibrate(&driver).await,
            Err(DriverError::Unsupported("calibrate"))
        ));
        assert!(driver.quit_calibrate().await.is_ok());
        assert!(driver.quit_park().await.is_ok());
    }

    #[test]
    fn test_driver_list_keeps_order() {
        let mut list = DriverList::new();
        list.push("left", "left_arm", Arc::new(Bare));
        list.push("right", "right_arm", Arc::new(Bare));

        assert_eq!(list.len(), 2);
        assert_eq!(list.keys().collect::<Vec<_>>(), vec!["left", "right"]);
        assert_eq!(list.find("right").map(|e| e.device()), Some("right_arm"));
        assert_eq!(format!("{:?}", list), r#"[("left", "left_arm"), ("right", "right_arm")]"#);
    }
}
