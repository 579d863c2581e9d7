use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::device::Device;

/// Ordered collection of shared devices.
///
/// Names are unique by convention only. [`find`](Self::find) returns the
/// first device with a given name.
#[derive(Clone, Default)]
pub struct DeviceList(Vec<Arc<Device>>);

impl DeviceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, device: Arc<Device>) {
        self.0.push(device);
    }

    /// Builder-style push taking ownership of a fresh device.
    pub fn with(mut self, device: Device) -> Self {
        self.0.push(Arc::new(device));
        self
    }

    pub fn find(&self, name: &str) -> Option<&Arc<Device>> {
        self.0.iter().find(|d| d.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Device>> {
        self.0.iter()
    }

    /// The list with every entry whose name appears in `external` replaced
    /// by the external device.
    ///
    /// Order and length are those of `self`: external devices never add new
    /// names. When `external` holds a name twice, the later entry wins.
    pub fn with_overrides(&self, external: &DeviceList) -> DeviceList {
        if external.is_empty() {
            return self.clone();
        }

        let overrides: HashMap<&str, &Arc<Device>> =
            external.iter().map(|d| (d.name(), d)).collect();

        self.0
            .iter()
            .map(|device| {
                overrides
                    .get(device.name())
                    .map(|d| Arc::clone(d))
                    .unwrap_or_else(|| Arc::clone(device))
            })
            .collect()
    }

    /// Devices of `self` followed by those of `other` that are not the very
    /// same shared device.
    pub fn union(&self, other: &DeviceList) -> DeviceList {
        let mut all = self.clone();
        for device in other.iter() {
            if !all.0.iter().any(|d| Arc::ptr_eq(d, device)) {
                all.0.push(Arc::clone(device));
            }
        }
        all
    }
}

impl FromIterator<Arc<Device>> for DeviceList {
    fn from_iter<I: IntoIterator<Item = Arc<Device>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Device>> for DeviceList {
    fn from(devices: Vec<Device>) -> Self {
        devices.into_iter().map(Arc::new).collect()
    }
}

impl<'a> IntoIterator for &'a DeviceList {
    type Item = &'a Arc<Device>;
    type IntoIter = std::slice::Iter<'a, Arc<Device>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Debug for DeviceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for DeviceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, device) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", device)?;
        }
        Ok(())
    }
}
