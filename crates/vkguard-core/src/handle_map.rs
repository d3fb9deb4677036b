use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};
use vkguard_api::{Handle, ObjectType};

use crate::error::HandleError;

/// First value minted for a wrapped handle. Far above anything the bundled
/// null driver hands out, so the two ranges are easy to tell apart in logs.
pub const WRAPPED_HANDLE_BASE: u64 = 0x2000_0000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WrappedEntry {
    real: Handle,
    object_type: ObjectType,
}

/// Mapping between layer-minted wrapped handles and driver handles.
///
/// Wrapped values come from a monotonically increasing counter and are never
/// reused, so a stale wrapped handle can always be told apart from a live one.
pub struct HandleMap {
    /// Wrapped handle -> driver handle
    wrapped_to_real: DashMap<u64, WrappedEntry>,
    /// Wrapped handles that have been released.
    released: DashSet<u64>,
    next_wrapped: AtomicU64,
}

impl HandleMap {
    pub fn new() -> Self {
        Self {
            wrapped_to_real: DashMap::new(),
            released: DashSet::new(),
            next_wrapped: AtomicU64::new(WRAPPED_HANDLE_BASE),
        }
    }

    /// Mint a wrapped handle for a driver handle. Null stays null.
    pub fn wrap(&self, real: Handle, object_type: ObjectType) -> Handle {
        if real.is_null() {
            return Handle::NULL;
        }
        let wrapped = self.next_wrapped.fetch_add(1, Ordering::Relaxed);
        self.wrapped_to_real
            .insert(wrapped, WrappedEntry { real, object_type });
        Handle(wrapped)
    }

    /// Look up the driver handle behind a wrapped handle.
    pub fn unwrap(&self, wrapped: Handle) -> Result<Handle, HandleError> {
        if wrapped.is_null() {
            return Ok(Handle::NULL);
        }
        match self.wrapped_to_real.get(&wrapped.0) {
            Some(entry) => Ok(entry.real),
            None if self.released.contains(&wrapped.0) => Err(HandleError::DoubleDestroy(wrapped)),
            None => Err(HandleError::InvalidHandle(wrapped)),
        }
    }

    /// Drop a wrapped handle, returning the driver handle it stood for.
    pub fn release(&self, wrapped: Handle) -> Result<Handle, HandleError> {
        if wrapped.is_null() {
            return Ok(Handle::NULL);
        }
        match self.wrapped_to_real.remove(&wrapped.0) {
            Some((_, entry)) => {
                self.released.insert(wrapped.0);
                Ok(entry.real)
            }
            None if self.released.contains(&wrapped.0) => Err(HandleError::DoubleDestroy(wrapped)),
            None => Err(HandleError::InvalidHandle(wrapped)),
        }
    }

    /// Stop remembering released handles. Later uses of them are reported as
    /// invalid rather than as double destroys.
    pub fn forget_released(&self, wrapped: impl IntoIterator<Item = Handle>) {
        for handle in wrapped {
            self.released.remove(&handle.0);
        }
    }

    /// Return number of released handles still remembered.
    pub fn released_len(&self) -> usize {
        self.released.len()
    }

    pub fn object_type(&self, wrapped: Handle) -> Option<ObjectType> {
        self.wrapped_to_real.get(&wrapped.0).map(|entry| entry.object_type)
    }

    /// Return number of live wrapped handles.
    pub fn len(&self) -> usize {
        self.wrapped_to_real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrapped_to_real.is_empty()
    }
}

impl Default for HandleMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic handle minting for a terminal driver.
pub struct HandleAllocator {
    next_id: AtomicU64,
}

impl HandleAllocator {
    pub fn new(first: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first.max(1)),
        }
    }

    pub fn alloc(&self) -> Handle {
        Handle(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}
