//! Object lifetime tracking: every handle argument must name a live object of
//! the right category, and whatever is still alive when its device or
//! instance goes away is reported as a leak.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use vkguard_api::{EntryPoint, Handle, HandleArg, ObjectType, VulkanCommand, VulkanResponse};
use vkguard_core::{DebugReport, Diagnostic, ErrorKind, LifetimeError};

use crate::dispatch::{validation_failed, CallContext, Intercept};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    Created,
    /// Referenced by at least one command buffer that has not been reset.
    InUse,
    Destroyed,
}

#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub object_type: ObjectType,
    /// Pool for command buffers and descriptor sets, otherwise the owner.
    pub parent: Handle,
    /// Device or instance the object belongs to.
    pub owner: Handle,
    pub created_by: EntryPoint,
    pub destroyed: bool,
    /// Command buffers that recorded a reference to the object.
    pub dependents: HashSet<Handle>,
}

impl ObjectRecord {
    pub fn status(&self) -> ObjectStatus {
        if self.destroyed {
            ObjectStatus::Destroyed
        } else if self.dependents.is_empty() {
            ObjectStatus::Created
        } else {
            ObjectStatus::InUse
        }
    }
}

pub struct ObjectTracker {
    objects: DashMap<Handle, ObjectRecord>,
    /// Command buffer -> objects it references.
    cb_refs: DashMap<Handle, HashSet<Handle>>,
    /// Pool -> command buffers / descriptor sets allocated from it.
    pool_children: DashMap<Handle, HashSet<Handle>>,
    report: Arc<DebugReport>,
}

impl ObjectTracker {
    pub fn new(report: Arc<DebugReport>) -> Self {
        Self {
            objects: DashMap::new(),
            cb_refs: DashMap::new(),
            pool_children: DashMap::new(),
            report,
        }
    }

    pub fn register(&self, handle: Handle, object_type: ObjectType, parent: Handle, owner: Handle, created_by: EntryPoint) {
        if handle.is_null() {
            return;
        }
        self.objects.insert(
            handle,
            ObjectRecord {
                object_type,
                parent,
                owner,
                created_by,
                destroyed: false,
                dependents: HashSet::new(),
            },
        );
        if matches!(object_type, ObjectType::CommandBuffer | ObjectType::DescriptorSet) {
            self.pool_children.entry(parent).or_default().insert(handle);
        }
    }

    pub fn assert_live(&self, handle: Handle, object_type: ObjectType) -> Result<(), LifetimeError> {
        let record = self
            .objects
            .get(&handle)
            .ok_or(LifetimeError::Unknown { handle })?;
        if record.object_type != object_type {
            return Err(LifetimeError::WrongType {
                handle,
                expected: object_type,
                actual: record.object_type,
            });
        }
        if record.destroyed {
            return Err(LifetimeError::UseAfterFree { handle, object_type });
        }
        Ok(())
    }

    fn assert_destroyable(&self, handle: Handle, object_type: ObjectType) -> Result<(), LifetimeError> {
        match self.assert_live(handle, object_type) {
            Err(LifetimeError::UseAfterFree { handle, object_type }) => {
                Err(LifetimeError::DoubleDestroy { handle, object_type })
            }
            other => other,
        }
    }

    pub fn mark_destroyed(&self, handle: Handle) {
        let children = self.pool_children.remove(&handle).map(|(_, c)| c);
        if let Some(mut record) = self.objects.get_mut(&handle) {
            record.destroyed = true;
            if matches!(record.object_type, ObjectType::CommandBuffer | ObjectType::DescriptorSet) {
                if let Some(mut siblings) = self.pool_children.get_mut(&record.parent) {
                    siblings.remove(&handle);
                }
            }
        }
        self.clear_cb_refs(handle);
        // Freeing a pool frees everything allocated from it.
        for child in children.into_iter().flatten() {
            self.mark_destroyed(child);
        }
    }

    pub fn status(&self, handle: Handle) -> Option<ObjectStatus> {
        self.objects.get(&handle).map(|r| r.status())
    }

    /// Live objects owned by `owner`, in handle order.
    pub fn live_children(&self, owner: Handle) -> Vec<(Handle, ObjectRecord)> {
        let mut live: Vec<_> = self
            .objects
            .iter()
            .filter(|e| e.owner == owner && !e.destroyed && *e.key() != owner)
            .filter(|e| !matches!(e.object_type, ObjectType::Queue | ObjectType::PhysicalDevice))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        live.sort_by_key(|(h, _)| *h);
        live
    }

    fn clear_cb_refs(&self, cb: Handle) {
        if let Some((_, refs)) = self.cb_refs.remove(&cb) {
            for obj in refs {
                if let Some(mut record) = self.objects.get_mut(&obj) {
                    record.dependents.remove(&cb);
                }
            }
        }
    }

    fn add_cb_refs(&self, cb: Handle, cmd: &VulkanCommand) {
        let mut refs = Vec::new();
        cmd.for_each_handle(|arg, handle| {
            if !handle.is_null() && *handle != cb && !arg.object_type.is_dispatchable() {
                refs.push(*handle);
            }
        });
        if let VulkanCommand::CmdExecuteCommands { command_buffers, .. } = cmd {
            refs.extend(command_buffers.iter().copied());
        }
        if refs.is_empty() {
            return;
        }
        for obj in &refs {
            if let Some(mut record) = self.objects.get_mut(obj) {
                record.dependents.insert(cb);
            }
        }
        self.cb_refs.entry(cb).or_default().extend(refs);
    }

    fn report_lifetime(&self, entry: EntryPoint, arg: HandleArg, err: LifetimeError) {
        let (kind, message_id, object_type) = match &err {
            LifetimeError::Unknown { .. } => (ErrorKind::UnknownObject, "ObjectTracker-UnknownObject", arg.object_type),
            LifetimeError::UseAfterFree { object_type, .. } => {
                (ErrorKind::UseAfterFree, "ObjectTracker-UseAfterFree", *object_type)
            }
            LifetimeError::DoubleDestroy { object_type, .. } => {
                (ErrorKind::DoubleDestroy, "ObjectTracker-DoubleDestroy", *object_type)
            }
            LifetimeError::WrongType { actual, .. } => (ErrorKind::InvalidHandle, "ObjectTracker-WrongType", *actual),
        };
        let handle = match &err {
            LifetimeError::Unknown { handle }
            | LifetimeError::UseAfterFree { handle, .. }
            | LifetimeError::DoubleDestroy { handle, .. }
            | LifetimeError::WrongType { handle, .. } => *handle,
        };
        self.report.report(
            Diagnostic::new(kind, message_id, format!("{}: {}: {}", entry.name(), arg.name, err))
                .with_object(object_type, handle),
        );
    }

    fn report_leaks(&self, owner: Handle, owner_type: ObjectType) {
        for (handle, record) in self.live_children(owner) {
            let mut message = format!(
                "{} {} created by {} was not destroyed before its {}",
                record.object_type.type_name(),
                handle,
                record.created_by.name(),
                owner_type.type_name()
            );
            if !record.dependents.is_empty() {
                message.push_str(&format!(" (referenced by {} command buffers)", record.dependents.len()));
            }
            self.report.report(
                Diagnostic::new(ErrorKind::ResourceLeak, "ObjectTracker-ResourceLeak", message)
                    .with_object(record.object_type, handle)
                    .with_object(owner_type, owner),
            );
        }
    }

    /// Forget every object of `owner`, destroyed ones included.
    fn retire_owner(&self, owner: Handle) {
        let retired: HashSet<Handle> = self
            .objects
            .iter()
            .filter(|e| e.owner == owner)
            .map(|e| *e.key())
            .collect();
        self.objects.retain(|handle, _| !retired.contains(handle));
        self.cb_refs.retain(|cb, _| !retired.contains(cb));
        self.pool_children.retain(|pool, _| !retired.contains(pool));
        tracing::debug!("retired {} tracked objects of {}", retired.len(), owner);
    }

    /// Return number of object records, destroyed ones included.
    pub fn tracked_objects(&self) -> usize {
        self.objects.len()
    }

    /// Return number of command buffers with recorded references.
    pub fn recording_command_buffers(&self) -> usize {
        self.cb_refs.len()
    }

    fn register_created(&self, cmd_info: &Created, resp: &VulkanResponse, ctx: &CallContext<'_>) {
        let owner = match ctx.entry {
            EntryPoint::CreateInstance => Handle::NULL,
            _ => ctx.owner.unwrap_or(Handle::NULL),
        };
        let parent = cmd_info.pool.unwrap_or(owner);
        resp.for_each_created(|object_type, handle| {
            // Repeated queries hand back the same dispatchable handle.
            if matches!(object_type, ObjectType::PhysicalDevice | ObjectType::Queue)
                && self.objects.contains_key(handle)
            {
                return;
            }
            self.register(*handle, object_type, parent, owner, ctx.entry);
        });
        if let (EntryPoint::CreateInstance, Some(instance)) = (ctx.entry, resp.handle()) {
            // An instance owns itself for leak accounting of its devices.
            if let Some(mut record) = self.objects.get_mut(&instance) {
                record.owner = instance;
            }
        }
    }
}

/// Parts of a command the post-call bookkeeping needs.
struct Created {
    pool: Option<Handle>,
}

impl Intercept for ObjectTracker {
    const NAME: &'static str = "object_tracker";

    fn intercept(&self, cmd: VulkanCommand, ctx: &CallContext<'_>) -> VulkanResponse {
        let mut failed = false;
        let mut destroyed = Vec::new();
        cmd.for_each_handle(|arg, handle| {
            if handle.is_null() {
                // Required null handles belong to parameter validation.
                return;
            }
            let result = if arg.is_destroyed() {
                self.assert_destroyable(*handle, arg.object_type)
            } else {
                self.assert_live(*handle, arg.object_type)
            };
            match result {
                Ok(()) if arg.is_destroyed() => destroyed.push(*handle),
                Ok(()) => {}
                Err(e) => {
                    failed = true;
                    self.report_lifetime(ctx.entry, arg, e);
                }
            }
        });
        if failed {
            return validation_failed();
        }

        let created = Created {
            pool: match &cmd {
                VulkanCommand::AllocateCommandBuffers { command_pool, .. } => Some(*command_pool),
                VulkanCommand::AllocateDescriptorSets { descriptor_pool, .. } => Some(*descriptor_pool),
                _ => None,
            },
        };
        if let Some(cb) = cmd.command_buffer() {
            match ctx.entry {
                EntryPoint::BeginCommandBuffer | EntryPoint::ResetCommandBuffer => self.clear_cb_refs(cb),
                _ => self.add_cb_refs(cb, &cmd),
            }
        }
        let reset_pool = match &cmd {
            VulkanCommand::ResetCommandPool { command_pool, .. } => Some(*command_pool),
            VulkanCommand::ResetDescriptorPool { pool, .. } => Some(*pool),
            _ => None,
        };

        let resp = ctx.forward(cmd);
        if resp.is_error() {
            return resp;
        }

        self.register_created(&created, &resp, ctx);

        match ctx.entry {
            EntryPoint::DestroyDevice => {
                if let Some(device) = ctx.key {
                    self.report_leaks(device, ObjectType::Device);
                    self.retire_owner(device);
                }
            }
            EntryPoint::DestroyInstance => {
                if let Some(instance) = ctx.key {
                    self.report_leaks(instance, ObjectType::Instance);
                    self.retire_owner(instance);
                }
            }
            _ => {}
        }
        match (ctx.entry, reset_pool) {
            (EntryPoint::ResetDescriptorPool, Some(pool)) => {
                if let Some((_, sets)) = self.pool_children.remove(&pool) {
                    for set in sets {
                        self.mark_destroyed(set);
                    }
                }
            }
            (EntryPoint::ResetCommandPool, Some(pool)) => {
                let buffers: Vec<Handle> = self
                    .pool_children
                    .get(&pool)
                    .map(|c| c.iter().copied().collect())
                    .unwrap_or_default();
                for cb in buffers {
                    self.clear_cb_refs(cb);
                }
            }
            _ => {}
        }
        for handle in destroyed {
            self.mark_destroyed(handle);
        }
        resp
    }
}
