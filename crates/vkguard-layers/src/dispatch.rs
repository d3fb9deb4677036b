//! Dispatch tables and the per-layer shim.
//!
//! Every layer resolves the next layer's entry points into immutable slot
//! arrays once per scope, then routes each call through the table that
//! belongs to the call's dispatchable handle.

use std::sync::{Arc, Weak};

use ash::vk;
use dashmap::DashMap;
use vkguard_api::{DispatchScope, EntryPoint, Handle, ObjectType, VulkanCommand, VulkanResponse};
use vkguard_core::{DebugReport, Diagnostic, ErrorKind, LayerError};

/// A resolved entry point of the next layer.
pub type PfnVkCall = Arc<dyn Fn(VulkanCommand) -> VulkanResponse + Send + Sync>;

/// Entry point lookup. Implemented by the terminal driver and by every layer,
/// so layers chain.
pub trait GetProcAddr: Send + Sync {
    fn get_proc_addr(&self, scope: DispatchScope, entry: EntryPoint) -> Option<PfnVkCall>;
}

/// The response returned for a call a layer refused to forward.
pub fn validation_failed() -> VulkanResponse {
    VulkanResponse::error(vk::Result::ERROR_VALIDATION_FAILED_EXT)
}

/// Next-layer function slots for one scope, indexed by [`EntryPoint`].
pub struct DispatchTable {
    scope: DispatchScope,
    slots: Box<[Option<PfnVkCall>]>,
}

impl DispatchTable {
    /// Resolve every entry point of `scope` from `next`.
    pub fn resolve(next: &dyn GetProcAddr, scope: DispatchScope) -> Result<Self, LayerError> {
        let mut slots: Vec<Option<PfnVkCall>> = vec![None; EntryPoint::COUNT];
        for entry in EntryPoint::in_scope(scope) {
            match next.get_proc_addr(scope, entry) {
                Some(pfn) => slots[entry.index()] = Some(pfn),
                None if entry.is_required() => {
                    return Err(LayerError::MissingEntryPoint {
                        name: entry.name(),
                        scope,
                    });
                }
                None => {}
            }
        }
        Ok(Self {
            scope,
            slots: slots.into_boxed_slice(),
        })
    }

    pub fn scope(&self) -> DispatchScope {
        self.scope
    }

    pub fn get(&self, entry: EntryPoint) -> Option<&PfnVkCall> {
        self.slots.get(entry.index()).and_then(Option::as_ref)
    }

    /// Call the next layer.
    pub fn forward(&self, cmd: VulkanCommand) -> VulkanResponse {
        let entry = cmd.entry_point();
        match self.get(entry) {
            Some(pfn) => pfn(cmd),
            None => {
                tracing::error!("{} is not in the {:?} dispatch table", entry.name(), self.scope);
                VulkanResponse::error(vk::Result::ERROR_INITIALIZATION_FAILED)
            }
        }
    }
}

/// What an interception sees besides the call itself.
pub struct CallContext<'a> {
    pub entry: EntryPoint,
    /// The dispatchable handle the call was dispatched through.
    pub key: Option<Handle>,
    /// The instance or device that owns `key`.
    pub owner: Option<Handle>,
    table: &'a DispatchTable,
}

impl CallContext<'_> {
    pub fn forward(&self, cmd: VulkanCommand) -> VulkanResponse {
        self.table.forward(cmd)
    }
}

/// One layer's behavior. The shim handles table routing around it.
pub trait Intercept: Send + Sync + 'static {
    const NAME: &'static str;

    fn intercept(&self, cmd: VulkanCommand, ctx: &CallContext<'_>) -> VulkanResponse;
}

/// Dispatchable-object bookkeeping a call implies, captured before the call
/// is handed to the layer.
enum Lifecycle {
    None,
    CreateInstance,
    EnumeratePhysicalDevices(Handle),
    CreateDevice,
    DeviceChildren(Handle),
    CommandBuffers { device: Handle, pool: Handle },
    FreeCommandBuffers(Vec<Handle>),
    DestroyCommandPool(Handle),
    DestroyDevice(Handle),
    DestroyInstance(Handle),
}

#[derive(Debug, Clone, Copy)]
struct Owner {
    /// Instance or device whose table the object dispatches through.
    parent: Handle,
    /// Command pool of a command buffer, null otherwise.
    pool: Handle,
}

impl Owner {
    fn of(parent: Handle) -> Self {
        Self {
            parent,
            pool: Handle::NULL,
        }
    }
}

/// Routes calls into a layer and owns its dispatch tables.
pub struct LayerShim<I: Intercept> {
    inner: I,
    next: Arc<dyn GetProcAddr>,
    report: Arc<DebugReport>,
    global: Arc<DispatchTable>,
    /// Resolved at construction so a missing instance entry point fails the
    /// chain build. Each instance shares it.
    instance_template: Arc<DispatchTable>,
    instance_tables: DashMap<Handle, Arc<DispatchTable>>,
    device_tables: DashMap<Handle, Arc<DispatchTable>>,
    /// physical device -> instance, queue / command buffer -> device
    owners: DashMap<Handle, Owner>,
    this: Weak<Self>,
}

impl<I: Intercept> LayerShim<I> {
    pub fn new(
        inner: I,
        next: Arc<dyn GetProcAddr>,
        report: Arc<DebugReport>,
    ) -> Result<Arc<Self>, LayerError> {
        let global = Arc::new(DispatchTable::resolve(next.as_ref(), DispatchScope::Global)?);
        let instance_template = Arc::new(DispatchTable::resolve(next.as_ref(), DispatchScope::Instance)?);
        tracing::debug!(layer = I::NAME, "layer initialized");
        Ok(Arc::new_cyclic(|this| Self {
            inner,
            next,
            report,
            global,
            instance_template,
            instance_tables: DashMap::new(),
            device_tables: DashMap::new(),
            owners: DashMap::new(),
            this: this.clone(),
        }))
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }

    /// Non-root dispatchable objects currently routed by this layer.
    pub fn routed_objects(&self) -> usize {
        self.owners.len()
    }

    /// Entry point of this layer: route, intercept, then update the
    /// dispatchable-object maps from the result.
    pub fn call(&self, cmd: VulkanCommand) -> VulkanResponse {
        let entry = cmd.entry_point();
        let key = cmd.dispatch_handle();

        let (table, owner) = match self.route(entry, key) {
            Some(route) => route,
            None => {
                let (object_type, handle) = key.unwrap_or((ObjectType::Instance, Handle::NULL));
                self.report.report(
                    Diagnostic::new(
                        ErrorKind::InvalidHandle,
                        "Dispatch-UnknownHandle",
                        format!(
                            "{}: {} {} is not a dispatchable object known to {}",
                            entry.name(),
                            object_type.type_name(),
                            handle,
                            I::NAME
                        ),
                    )
                    .with_object(object_type, handle),
                );
                return validation_failed();
            }
        };

        let lifecycle = lifecycle_of(&cmd, owner);
        let device_table = if entry == EntryPoint::CreateDevice {
            match DispatchTable::resolve(self.next.as_ref(), DispatchScope::Device) {
                Ok(t) => Some(Arc::new(t)),
                Err(e) => {
                    tracing::error!(layer = I::NAME, "vkCreateDevice: {}", e);
                    return VulkanResponse::error(vk::Result::ERROR_INITIALIZATION_FAILED);
                }
            }
        } else {
            None
        };

        let ctx = CallContext {
            entry,
            key: key.map(|(_, h)| h),
            owner,
            table: &table,
        };
        tracing::trace!(layer = I::NAME, entry = entry.name(), "intercept");
        let resp = self.inner.intercept(cmd, &ctx);

        if !resp.is_error() {
            self.apply_lifecycle(lifecycle, &resp, device_table);
        }
        resp
    }

    fn route(
        &self,
        entry: EntryPoint,
        key: Option<(ObjectType, Handle)>,
    ) -> Option<(Arc<DispatchTable>, Option<Handle>)> {
        let Some((object_type, handle)) = key else {
            // Global commands carry no dispatchable handle.
            debug_assert_eq!(entry.scope(), DispatchScope::Global);
            return Some((self.global.clone(), None));
        };
        let owner = match object_type {
            ObjectType::Instance | ObjectType::Device => handle,
            _ => self.owners.get(&handle)?.parent,
        };
        let table = match entry.scope() {
            DispatchScope::Instance => self.instance_tables.get(&owner)?.clone(),
            DispatchScope::Device => self.device_tables.get(&owner)?.clone(),
            DispatchScope::Global => return None,
        };
        Some((table, Some(owner)))
    }

    fn apply_lifecycle(
        &self,
        lifecycle: Lifecycle,
        resp: &VulkanResponse,
        device_table: Option<Arc<DispatchTable>>,
    ) {
        match lifecycle {
            Lifecycle::None => {}
            Lifecycle::CreateInstance => {
                if let Some(instance) = resp.handle() {
                    self.instance_tables
                        .insert(instance, self.instance_template.clone());
                }
            }
            Lifecycle::EnumeratePhysicalDevices(instance) => {
                for physical_device in resp.handles() {
                    self.owners.insert(physical_device, Owner::of(instance));
                }
            }
            Lifecycle::CreateDevice => {
                if let (Some(device), Some(table)) = (resp.handle(), device_table) {
                    self.device_tables.insert(device, table);
                }
            }
            Lifecycle::DeviceChildren(device) => {
                for child in resp.handles() {
                    self.owners.insert(child, Owner::of(device));
                }
            }
            Lifecycle::CommandBuffers { device, pool } => {
                for cb in resp.handles() {
                    self.owners.insert(cb, Owner { parent: device, pool });
                }
            }
            Lifecycle::FreeCommandBuffers(freed) => {
                for cb in freed {
                    self.owners.remove(&cb);
                }
            }
            Lifecycle::DestroyCommandPool(pool) => {
                self.owners.retain(|_, owner| owner.pool != pool);
            }
            Lifecycle::DestroyDevice(device) => {
                self.device_tables.remove(&device);
                self.owners.retain(|_, owner| owner.parent != device);
            }
            Lifecycle::DestroyInstance(instance) => {
                self.instance_tables.remove(&instance);
                self.owners.retain(|_, owner| owner.parent != instance);
            }
        }
    }
}

fn lifecycle_of(cmd: &VulkanCommand, owner: Option<Handle>) -> Lifecycle {
    let owner = owner.unwrap_or(Handle::NULL);
    match cmd {
        VulkanCommand::CreateInstance { .. } => Lifecycle::CreateInstance,
        VulkanCommand::EnumeratePhysicalDevices { .. } => Lifecycle::EnumeratePhysicalDevices(owner),
        VulkanCommand::CreateDevice { .. } => Lifecycle::CreateDevice,
        VulkanCommand::GetDeviceQueue { .. } => Lifecycle::DeviceChildren(owner),
        VulkanCommand::AllocateCommandBuffers { command_pool, .. } => Lifecycle::CommandBuffers {
            device: owner,
            pool: *command_pool,
        },
        VulkanCommand::FreeCommandBuffers { command_buffers, .. } => {
            Lifecycle::FreeCommandBuffers(command_buffers.clone())
        }
        VulkanCommand::DestroyCommandPool { command_pool, .. } => Lifecycle::DestroyCommandPool(*command_pool),
        VulkanCommand::DestroyDevice { device } => Lifecycle::DestroyDevice(*device),
        VulkanCommand::DestroyInstance { instance } => Lifecycle::DestroyInstance(*instance),
        _ => Lifecycle::None,
    }
}

impl<I: Intercept> GetProcAddr for LayerShim<I> {
    fn get_proc_addr(&self, scope: DispatchScope, entry: EntryPoint) -> Option<PfnVkCall> {
        // Only expose what the next layer provides.
        self.next.get_proc_addr(scope, entry)?;
        let this = self.this.upgrade()?;
        Some(Arc::new(move |cmd| this.call(cmd)))
    }
}
