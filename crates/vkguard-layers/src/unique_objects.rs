//! Replaces every driver-returned non-dispatchable handle with a
//! layer-minted one and translates back on the way down.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use vkguard_api::{Handle, VulkanCommand, VulkanResponse};
use vkguard_core::{DebugReport, Diagnostic, ErrorKind, HandleError, HandleMap};

use crate::dispatch::{validation_failed, CallContext, Intercept};

pub struct UniqueObjects {
    map: HandleMap,
    /// Wrapped descriptor pool -> wrapped sets allocated from it.
    pool_sets: DashMap<Handle, HashSet<Handle>>,
    /// Device -> wrapped handles created through it.
    device_objects: DashMap<Handle, HashSet<Handle>>,
    /// Device -> wrapped handles of it that were destroyed while it lived.
    device_released: DashMap<Handle, Vec<Handle>>,
    report: Arc<DebugReport>,
}

impl UniqueObjects {
    pub fn new(report: Arc<DebugReport>) -> Self {
        Self {
            map: HandleMap::new(),
            pool_sets: DashMap::new(),
            device_objects: DashMap::new(),
            device_released: DashMap::new(),
            report,
        }
    }

    pub fn live_handles(&self) -> usize {
        self.map.len()
    }

    /// Destroyed handles still remembered for double-destroy reports.
    pub fn released_handles(&self) -> usize {
        self.map.released_len()
    }

    fn release(&self, device: Option<Handle>, wrapped: Handle) {
        if let Err(e) = self.map.release(wrapped) {
            tracing::debug!("release of {} after forwarding: {}", wrapped, e);
            return;
        }
        if let Some(device) = device {
            if let Some(mut objects) = self.device_objects.get_mut(&device) {
                objects.remove(&wrapped);
            }
            self.device_released.entry(device).or_default().push(wrapped);
        }
    }

    /// Drop everything remembered about `device`'s handles.
    fn retire_device(&self, device: Handle) {
        if let Some((_, objects)) = self.device_objects.remove(&device) {
            tracing::debug!("dropping {} wrapped handles of destroyed device", objects.len());
            for wrapped in &objects {
                if let Err(e) = self.map.release(*wrapped) {
                    tracing::debug!("release of {} on device teardown: {}", wrapped, e);
                }
            }
            self.map.forget_released(objects);
        }
        if let Some((_, released)) = self.device_released.remove(&device) {
            self.map.forget_released(released);
        }
        self.pool_sets.retain(|pool, _| self.map.object_type(*pool).is_some());
    }

    fn release_pool_sets(&self, device: Option<Handle>, pool: Handle) {
        if let Some((_, sets)) = self.pool_sets.remove(&pool) {
            for set in sets {
                self.release(device, set);
            }
        }
    }
}

impl Intercept for UniqueObjects {
    const NAME: &'static str = "unique_objects";

    fn intercept(&self, mut cmd: VulkanCommand, ctx: &CallContext<'_>) -> VulkanResponse {
        let wrapped_pool = descriptor_pool_of(&cmd);
        let mut destroyed = Vec::new();
        let mut failures = Vec::new();

        cmd.for_each_handle_mut(|arg, handle| {
            if arg.object_type.is_dispatchable() || handle.is_null() {
                return;
            }
            if arg.is_destroyed() {
                destroyed.push(*handle);
            }
            match self.map.unwrap(*handle) {
                Ok(real) => *handle = real,
                Err(e) => failures.push((arg, *handle, e)),
            }
        });

        if !failures.is_empty() {
            for (arg, handle, err) in failures {
                let message_id = match err {
                    HandleError::DoubleDestroy(_) if arg.is_destroyed() => "UniqueObjects-DoubleDestroy",
                    _ => "UniqueObjects-InvalidHandle",
                };
                self.report.report(
                    Diagnostic::new(
                        ErrorKind::InvalidHandle,
                        message_id,
                        format!("{}: {} {}", ctx.entry.name(), arg.name, err),
                    )
                    .with_object(arg.object_type, handle),
                );
            }
            return validation_failed();
        }

        let is_pool_reset = matches!(
            cmd,
            VulkanCommand::ResetDescriptorPool { .. } | VulkanCommand::DestroyDescriptorPool { .. }
        );
        let is_device_destroy = matches!(cmd, VulkanCommand::DestroyDevice { .. });

        let mut resp = ctx.forward(cmd);
        if resp.is_error() {
            return resp;
        }

        let device = ctx.owner;
        let mut created = Vec::new();
        resp.for_each_created_mut(|object_type, handle| {
            if object_type.is_dispatchable() {
                return;
            }
            *handle = self.map.wrap(*handle, object_type);
            created.push(*handle);
        });
        if let Some(device) = device {
            if !created.is_empty() {
                self.device_objects
                    .entry(device)
                    .or_default()
                    .extend(created.iter().copied());
            }
        }
        if let (Some(pool), VulkanResponse::DescriptorSetsAllocated { handles }) = (wrapped_pool, &resp) {
            self.pool_sets.entry(pool).or_default().extend(handles.iter().copied());
        }

        if is_pool_reset {
            if let Some(pool) = wrapped_pool {
                self.release_pool_sets(device, pool);
            }
        }
        for wrapped in destroyed {
            if let Some(pool) = wrapped_pool {
                if let Some(mut sets) = self.pool_sets.get_mut(&pool) {
                    sets.remove(&wrapped);
                }
            }
            self.release(device, wrapped);
        }

        if is_device_destroy {
            if let Some(device) = device {
                self.retire_device(device);
            }
        }
        resp
    }
}

/// The descriptor pool a pool-scoped call operates on.
fn descriptor_pool_of(cmd: &VulkanCommand) -> Option<Handle> {
    match cmd {
        VulkanCommand::AllocateDescriptorSets { descriptor_pool, .. }
        | VulkanCommand::FreeDescriptorSets { descriptor_pool, .. } => Some(*descriptor_pool),
        VulkanCommand::ResetDescriptorPool { pool, .. }
        | VulkanCommand::DestroyDescriptorPool { pool, .. } => Some(*pool),
        _ => None,
    }
}
