//! Stateful validation of command buffers, descriptors, render passes,
//! memory, and queue submissions.
//!
//! Each device owns one [`DeviceState`] behind a mutex. The lock is taken for
//! the pre-call checks and again for the post-call update, never while the
//! call is forwarded. `vkCmd*` calls are recorded before forwarding, since a
//! recording call cannot fail; everything else updates the shadow state only
//! after the driver returned success.

pub mod command_buffer;
pub mod descriptor;
pub mod render_pass;
pub mod state;
pub mod submit;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use ash::vk;
use dashmap::DashMap;
use parking_lot::Mutex;
use vkguard_api::{EntryPoint, Handle, ObjectType, VulkanCommand, VulkanResponse};
use vkguard_core::{DebugReport, Diagnostic, ErrorKind, HazardStrictness, LayerSettings};

use crate::dispatch::{validation_failed, CallContext, Intercept};
use crate::shader_validation::{self, ShaderReflector};
use command_buffer::{CommandBufferState, CommandBufferStatus};
use state::{Objects, PipelineState};
use submit::{QueueState, SubmissionTracker};

pub(crate) fn usage_error(entry: EntryPoint, message_id: &'static str, message: impl fmt::Display) -> Diagnostic {
    Diagnostic::new(ErrorKind::InvalidUsage, message_id, format!("{}: {}", entry.name(), message))
}

/// Whether a call may reach the driver after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Forward,
    Suppress,
}

/// Shadow state of one logical device.
#[derive(Default)]
pub struct DeviceState {
    pub objects: Objects,
    pub command_buffers: HashMap<Handle, CommandBufferState>,
    /// Object -> command buffers whose recording references it.
    pub refs: HashMap<Handle, HashSet<Handle>>,
    pub queues: HashMap<Handle, QueueState>,
    pub submissions: SubmissionTracker,
    /// Layout of each image as of the last submission.
    pub image_layouts: HashMap<Handle, vk::ImageLayout>,
}

impl DeviceState {
    pub fn pool_allows_reset(&self, pool: Handle) -> bool {
        self.objects
            .command_pools
            .get(&pool)
            .map_or(true, |p| p.allows_reset())
    }

    /// Forget the references a command buffer recorded.
    pub fn unlink(&mut self, cb: Handle) {
        let Some(state) = self.command_buffers.get(&cb) else {
            return;
        };
        for object in &state.referenced {
            let now_empty = match self.refs.get_mut(object) {
                Some(users) => {
                    users.remove(&cb);
                    users.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.refs.remove(object);
            }
        }
    }

    pub fn remove_command_buffer(&mut self, cb: Handle) {
        self.unlink(cb);
        self.command_buffers.remove(&cb);
        self.invalidate_dependents(cb);
    }

    /// Invalidate every command buffer that recorded `object`.
    pub fn invalidate_dependents(&mut self, object: Handle) {
        let Some(users) = self.refs.remove(&object) else {
            return;
        };
        for cb in users {
            if let Some(state) = self.command_buffers.get_mut(&cb) {
                tracing::debug!(command_buffer = %cb, by = %object, "command buffer invalidated");
                state.invalidate(object);
            }
        }
    }

    fn pending_users(&self, object: Handle) -> Vec<Handle> {
        let mut users: Vec<Handle> = self
            .refs
            .get(&object)
            .into_iter()
            .flatten()
            .copied()
            .filter(|cb| {
                self.command_buffers
                    .get(cb)
                    .is_some_and(|s| s.status == CommandBufferStatus::Pending)
            })
            .collect();
        users.sort();
        users
    }

    /// Objects a call destroys or changes underneath recorded command buffers.
    fn affected_objects(&self, cmd: &VulkanCommand) -> Vec<(ObjectType, Handle)> {
        let mut affected = Vec::new();
        cmd.for_each_handle(|arg, handle| {
            if arg.is_destroyed()
                && !handle.is_null()
                && !arg.object_type.is_dispatchable()
                && arg.object_type != ObjectType::CommandPool
            {
                affected.push((arg.object_type, *handle));
            }
        });
        affected.extend(
            descriptor::freed_sets(&self.objects, cmd)
                .into_iter()
                .map(|set| (ObjectType::DescriptorSet, set)),
        );
        if let VulkanCommand::UpdateDescriptorSets { writes, .. } = cmd {
            affected.extend(writes.iter().map(|w| (ObjectType::DescriptorSet, w.dst_set)));
        }
        affected.sort_by_key(|(_, h)| *h);
        affected.dedup();
        affected
    }

    fn check_in_use(&self, cmd: &VulkanCommand, issues: &mut Vec<Diagnostic>) {
        let entry = cmd.entry_point();
        for (object_type, handle) in self.affected_objects(cmd) {
            for cb in self.pending_users(handle) {
                issues.push(
                    usage_error(
                        entry,
                        "CoreValidation-Object-InUse",
                        format!(
                            "{} {} is referenced by command buffer {}, which is pending execution",
                            object_type.type_name(),
                            handle,
                            cb
                        ),
                    )
                    .with_object(object_type, handle)
                    .with_object(ObjectType::CommandBuffer, cb),
                );
            }
        }
    }

    /// Pre-call checks.
    pub(crate) fn validate(
        &mut self,
        cmd: &VulkanCommand,
        reflector: Option<&dyn ShaderReflector>,
        strictness: HazardStrictness,
        issues: &mut Vec<Diagnostic>,
    ) -> Verdict {
        if cmd.entry_point().is_recording() {
            return command_buffer::record(self, cmd, issues);
        }
        self.check_in_use(cmd, issues);

        match cmd {
            VulkanCommand::BeginCommandBuffer {
                command_buffer,
                flags,
                inheritance,
            } => command_buffer::validate_begin(self, *command_buffer, *flags, inheritance.as_ref(), issues),
            VulkanCommand::EndCommandBuffer { command_buffer } => {
                command_buffer::validate_end(self, *command_buffer, issues)
            }
            VulkanCommand::ResetCommandBuffer { command_buffer, .. } => {
                command_buffer::validate_reset(self, *command_buffer, issues)
            }
            VulkanCommand::FreeCommandBuffers { .. }
            | VulkanCommand::ResetCommandPool { .. }
            | VulkanCommand::DestroyCommandPool { .. } => command_buffer::validate_pool_op(self, cmd, issues),
            VulkanCommand::QueueSubmit { queue, submits, fence } => {
                submit::validate_submit(self, *queue, submits, *fence, strictness, issues)
            }
            VulkanCommand::ResetFences { .. } | VulkanCommand::DestroyFence { .. } => {
                submit::validate_fences(self, cmd, issues)
            }
            VulkanCommand::AllocateDescriptorSets { .. }
            | VulkanCommand::FreeDescriptorSets { .. }
            | VulkanCommand::UpdateDescriptorSets { .. } => descriptor::validate(&self.objects, cmd, issues),
            VulkanCommand::MapMemory { .. }
            | VulkanCommand::UnmapMemory { .. }
            | VulkanCommand::BindBufferMemory { .. }
            | VulkanCommand::BindImageMemory { .. } => self.objects.validate_memory(cmd, issues),
            VulkanCommand::CreateGraphicsPipelines { create_infos, .. } => {
                if let Some(reflector) = reflector {
                    for (index, info) in create_infos.iter().enumerate() {
                        shader_validation::validate_graphics_pipeline(&mut self.objects, reflector, index, info, issues);
                    }
                }
            }
            VulkanCommand::CreateComputePipelines { create_infos, .. } => {
                if let Some(reflector) = reflector {
                    for (index, info) in create_infos.iter().enumerate() {
                        shader_validation::validate_compute_pipeline(&mut self.objects, reflector, index, info, issues);
                    }
                }
            }
            _ => {}
        }
        Verdict::Forward
    }

    /// Post-call update after the driver returned a non-error result.
    pub(crate) fn update(&mut self, cmd: &VulkanCommand, resp: &VulkanResponse, reflector: Option<&dyn ShaderReflector>) {
        let affected = self.affected_objects(cmd);

        match cmd {
            VulkanCommand::GetDeviceQueue {
                queue_family_index, ..
            } => {
                if let Some(queue) = resp.handle() {
                    self.queues.insert(
                        queue,
                        QueueState {
                            family: *queue_family_index,
                        },
                    );
                }
            }
            VulkanCommand::CreateImage { create_info, .. } => {
                if let Some(image) = resp.handle() {
                    self.image_layouts
                        .insert(image, vk::ImageLayout::from_raw(create_info.initial_layout));
                }
            }
            VulkanCommand::CreateGraphicsPipelines { create_infos, .. } => {
                for (info, pipeline) in create_infos.iter().zip(resp.handles()) {
                    let used_bindings = match reflector {
                        Some(reflector) => shader_validation::used_bindings(&mut self.objects, reflector, &info.stages),
                        None => Vec::new(),
                    };
                    let dynamic = |state: vk::DynamicState| info.dynamic_states.contains(&state.as_raw());
                    let state = PipelineState {
                        bind_point: vk::PipelineBindPoint::GRAPHICS,
                        layout: info.layout,
                        layout_state: self.objects.pipeline_layouts.get(&info.layout).cloned().unwrap_or_default(),
                        render_pass: self
                            .objects
                            .render_passes
                            .get(&info.render_pass)
                            .map(|rp| (info.render_pass, rp.clone())),
                        subpass: info.subpass,
                        vertex_bindings: info.vertex_input.bindings.iter().map(|b| b.binding).collect(),
                        dynamic_viewport: dynamic(vk::DynamicState::VIEWPORT),
                        dynamic_scissor: dynamic(vk::DynamicState::SCISSOR),
                        used_bindings,
                    };
                    self.objects.pipelines.insert(pipeline, Arc::new(state));
                }
            }
            VulkanCommand::CreateComputePipelines { create_infos, .. } => {
                for (info, pipeline) in create_infos.iter().zip(resp.handles()) {
                    let used_bindings = match reflector {
                        Some(reflector) => {
                            shader_validation::used_bindings(&mut self.objects, reflector, std::iter::once(&info.stage))
                        }
                        None => Vec::new(),
                    };
                    let state = PipelineState {
                        bind_point: vk::PipelineBindPoint::COMPUTE,
                        layout: info.layout,
                        layout_state: self.objects.pipeline_layouts.get(&info.layout).cloned().unwrap_or_default(),
                        render_pass: None,
                        subpass: 0,
                        vertex_bindings: Vec::new(),
                        dynamic_viewport: false,
                        dynamic_scissor: false,
                        used_bindings,
                    };
                    self.objects.pipelines.insert(pipeline, Arc::new(state));
                }
            }
            VulkanCommand::DestroyImage { image, .. } => {
                self.image_layouts.remove(image);
            }
            _ => {}
        }

        self.objects.record_created(cmd, resp);
        self.objects.record_memory(cmd);
        command_buffer::update(self, cmd, resp);
        descriptor::update(&mut self.objects, cmd, resp);
        submit::update(self, cmd, resp.result());

        for (_, handle) in affected {
            self.invalidate_dependents(handle);
        }
        self.objects.record_destroyed(cmd);
    }
}

/// The core validation layer.
pub struct CoreValidation {
    devices: DashMap<Handle, Arc<Mutex<DeviceState>>>,
    report: Arc<DebugReport>,
    reflector: Option<Arc<dyn ShaderReflector>>,
    strictness: HazardStrictness,
}

impl CoreValidation {
    /// `reflector` is `None` when shader interface checks are disabled.
    pub fn new(report: Arc<DebugReport>, settings: &LayerSettings, reflector: Option<Arc<dyn ShaderReflector>>) -> Self {
        Self {
            devices: DashMap::new(),
            report,
            reflector,
            strictness: settings.core.hazard_strictness,
        }
    }

    fn device(&self, device: Handle) -> Option<Arc<Mutex<DeviceState>>> {
        self.devices.get(&device).map(|d| d.clone())
    }

    /// Lifecycle state of a command buffer, if the layer knows it.
    pub fn command_buffer_status(&self, device: Handle, command_buffer: Handle) -> Option<CommandBufferStatus> {
        let state = self.device(device)?;
        let state = state.lock();
        state.command_buffers.get(&command_buffer).map(|cb| cb.status)
    }

    /// Submissions not yet retired on `device`.
    pub fn pending_submissions(&self, device: Handle) -> usize {
        self.device(device).map_or(0, |state| state.lock().submissions.len())
    }
}

impl Intercept for CoreValidation {
    const NAME: &'static str = "core_validation";

    fn intercept(&self, cmd: VulkanCommand, ctx: &CallContext<'_>) -> VulkanResponse {
        match ctx.entry {
            EntryPoint::CreateDevice => {
                let resp = ctx.forward(cmd);
                if let Some(device) = resp.handle().filter(|_| !resp.is_error()) {
                    self.devices.insert(device, Arc::new(Mutex::new(DeviceState::default())));
                }
                return resp;
            }
            EntryPoint::DestroyDevice => {
                let device = ctx.key.unwrap_or(Handle::NULL);
                let resp = ctx.forward(cmd);
                self.devices.remove(&device);
                return resp;
            }
            _ => {}
        }

        let Some(state) = ctx.owner.and_then(|device| self.device(device)) else {
            return ctx.forward(cmd);
        };

        let reflector = self.reflector.as_deref();
        let mut issues = Vec::new();
        let (verdict, deferred) = {
            let mut state = state.lock();
            let verdict = state.validate(&cmd, reflector, self.strictness, &mut issues);
            (verdict, (!ctx.entry.is_recording()).then(|| cmd.clone()))
        };
        for diag in issues {
            self.report.report(diag);
        }
        if verdict == Verdict::Suppress {
            return validation_failed();
        }

        let resp = ctx.forward(cmd);
        if let Some(cmd) = deferred {
            if !resp.is_error() {
                state.lock().update(&cmd, &resp, reflector);
            }
        }
        resp
    }
}
