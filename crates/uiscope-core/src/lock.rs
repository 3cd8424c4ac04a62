//! Per-device mutual exclusion.
//!
//! Two overlapping dumps against one device race on the same on-device dump
//! file, and overlapping captures contend for the same transport. Every
//! device operation in [`Device`](crate::device::Device) therefore holds the
//! device's guard from [`DeviceLocks`] for its whole duration. Operations on
//! different devices proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// Registry of async mutexes keyed by device identity.
#[derive(Debug, Default)]
pub struct DeviceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static DeviceLocks {
        static GLOBAL: OnceLock<DeviceLocks> = OnceLock::new();
        GLOBAL.get_or_init(DeviceLocks::new)
    }

    /// Waits for exclusive access to `device`.
    pub async fn acquire(&self, device: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(device.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of devices seen so far.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
