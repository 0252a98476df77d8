//! Hardware-access exclusion.
//!
//! Sensors on the same physical bus share one [`BusLock`]. The guard is held
//! for a single bus transaction only; callers drop it before sleeping.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

/// Exclusive access to one physical bus
#[derive(Debug, Clone)]
pub struct BusLock {
    name: Arc<str>,
    inner: Arc<Mutex<()>>,
}

impl BusLock {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().await
    }

    /// Whether two handles guard the same bus
    pub fn same_bus(&self, other: &BusLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Hands out one [`BusLock`] per bus name
#[derive(Debug, Default)]
pub struct BusRegistry {
    buses: HashMap<String, BusLock>,
}

impl BusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, name: &str) -> BusLock {
        self.buses
            .entry(name.to_string())
            .or_insert_with(|| BusLock::new(name))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }
}
