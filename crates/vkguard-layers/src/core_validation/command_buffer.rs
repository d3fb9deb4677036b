//! Command buffer lifecycle and record-time validation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use ash::vk;
use vkguard_api::vulkan_commands::{BufferCopy, BufferImageCopy, CommandBufferInheritanceInfo, ImageMemoryBarrier};
use vkguard_api::{EntryPoint, Handle, ObjectType, VulkanCommand, VulkanResponse};
use vkguard_core::{Diagnostic, ErrorKind};

use super::state::{Objects, PipelineState, SetLayoutState};
use super::{descriptor, render_pass, usage_error, DeviceState, Verdict};
use crate::core_validation::render_pass::RenderPassState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferStatus {
    Initial,
    Recording,
    Executable,
    Pending,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct CommandPoolState {
    pub flags: vk::CommandPoolCreateFlags,
    pub queue_family_index: u32,
    pub command_buffers: HashSet<Handle>,
}

impl CommandPoolState {
    pub fn allows_reset(&self) -> bool {
        self.flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
    }
}

/// A resource read or written by recorded commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAccess {
    pub resource: Handle,
    pub write: bool,
    /// A pipeline barrier was recorded before the access.
    pub after_barrier: bool,
}

#[derive(Debug, Clone)]
pub struct BoundSet {
    pub set: Handle,
    /// Pipeline layout the set was bound with.
    pub pipeline_layout: Handle,
    pub set_layout: Arc<SetLayoutState>,
}

#[derive(Debug, Clone, Default)]
pub struct BindPointState {
    pub pipeline: Option<(Handle, Arc<PipelineState>)>,
    pub sets: BTreeMap<u32, BoundSet>,
}

#[derive(Debug, Clone)]
pub struct RenderPassScope {
    pub render_pass: Handle,
    pub state: Arc<RenderPassState>,
    pub framebuffer: Handle,
    pub subpass: u32,
    /// Images of the framebuffer attachments, by attachment index.
    pub attachment_images: Vec<Option<Handle>>,
}

#[derive(Debug, Clone)]
pub struct CommandBufferState {
    pub pool: Handle,
    pub level: vk::CommandBufferLevel,
    pub status: CommandBufferStatus,
    pub usage: vk::CommandBufferUsageFlags,
    /// Outstanding submissions.
    pub pending: u32,
    /// The destroyed or updated object that invalidated the buffer.
    pub invalidated_by: Option<Handle>,
    pub commands: Vec<EntryPoint>,
    pub graphics: BindPointState,
    pub compute: BindPointState,
    pub vertex_buffers: BTreeMap<u32, Handle>,
    pub index_buffer: Option<Handle>,
    pub viewport_set: bool,
    pub scissor_set: bool,
    pub render_pass: Option<RenderPassScope>,
    pub accesses: Vec<ResourceAccess>,
    pub barrier_recorded: bool,
    /// Layout each image must be in when execution starts.
    pub initial_layouts: HashMap<Handle, vk::ImageLayout>,
    /// Layout each image is left in.
    pub current_layouts: HashMap<Handle, vk::ImageLayout>,
    pub referenced: HashSet<Handle>,
    pub secondaries: Vec<Handle>,
}

impl CommandBufferState {
    pub fn new(pool: Handle, level: vk::CommandBufferLevel) -> Self {
        Self {
            pool,
            level,
            status: CommandBufferStatus::Initial,
            usage: vk::CommandBufferUsageFlags::empty(),
            pending: 0,
            invalidated_by: None,
            commands: Vec::new(),
            graphics: BindPointState::default(),
            compute: BindPointState::default(),
            vertex_buffers: BTreeMap::new(),
            index_buffer: None,
            viewport_set: false,
            scissor_set: false,
            render_pass: None,
            accesses: Vec::new(),
            barrier_recorded: false,
            initial_layouts: HashMap::new(),
            current_layouts: HashMap::new(),
            referenced: HashSet::new(),
            secondaries: Vec::new(),
        }
    }

    fn clear_recording(&mut self) {
        let fresh = Self::new(self.pool, self.level);
        *self = Self {
            status: self.status,
            ..fresh
        };
    }

    pub fn reset(&mut self) {
        self.clear_recording();
        self.status = CommandBufferStatus::Initial;
    }

    pub fn begin(&mut self, usage: vk::CommandBufferUsageFlags) {
        self.clear_recording();
        self.status = CommandBufferStatus::Recording;
        self.usage = usage;
    }

    pub fn allows_simultaneous_use(&self) -> bool {
        self.usage.contains(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
    }

    pub fn is_executable_for_submit(&self) -> bool {
        self.status == CommandBufferStatus::Executable
            || (self.status == CommandBufferStatus::Pending && self.allows_simultaneous_use())
    }

    pub fn mark_pending(&mut self) {
        self.status = CommandBufferStatus::Pending;
        self.pending += 1;
    }

    /// One submission of the buffer finished executing.
    pub fn complete(&mut self) {
        if self.status != CommandBufferStatus::Pending {
            return;
        }
        self.pending = self.pending.saturating_sub(1);
        if self.pending == 0 {
            let one_time = self.usage.contains(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.status = if one_time || self.invalidated_by.is_some() {
                CommandBufferStatus::Invalid
            } else {
                CommandBufferStatus::Executable
            };
        }
    }

    /// A referenced object was destroyed or updated.
    pub fn invalidate(&mut self, by: Handle) {
        self.invalidated_by = Some(by);
        if matches!(self.status, CommandBufferStatus::Recording | CommandBufferStatus::Executable) {
            self.status = CommandBufferStatus::Invalid;
        }
    }

    pub fn bind_point(&self, bind_point: vk::PipelineBindPoint) -> &BindPointState {
        if bind_point == vk::PipelineBindPoint::COMPUTE {
            &self.compute
        } else {
            &self.graphics
        }
    }

    pub fn bind_point_mut(&mut self, bind_point: vk::PipelineBindPoint) -> &mut BindPointState {
        if bind_point == vk::PipelineBindPoint::COMPUTE {
            &mut self.compute
        } else {
            &mut self.graphics
        }
    }
}

/// Record-time view of one command buffer and the device's objects.
pub(crate) struct Recorder<'a> {
    pub entry: EntryPoint,
    pub handle: Handle,
    pub cb: &'a mut CommandBufferState,
    pub objects: &'a Objects,
    issues: &'a mut Vec<Diagnostic>,
    new_refs: Vec<Handle>,
}

impl Recorder<'_> {
    pub fn report(&mut self, kind: ErrorKind, message_id: &'static str, message: String) -> &mut Diagnostic {
        self.issues.push(
            Diagnostic::new(kind, message_id, format!("{}: {}", self.entry.name(), message))
                .with_object(ObjectType::CommandBuffer, self.handle),
        );
        let last = self.issues.len() - 1;
        &mut self.issues[last]
    }

    pub fn usage(&mut self, message_id: &'static str, message: String) -> &mut Diagnostic {
        self.report(ErrorKind::InvalidUsage, message_id, message)
    }

    pub fn reference(&mut self, handle: Handle) {
        if !handle.is_null() && self.cb.referenced.insert(handle) {
            self.new_refs.push(handle);
        }
    }

    pub fn access(&mut self, resource: Handle, write: bool) {
        let after_barrier = self.cb.barrier_recorded;
        self.cb.accesses.push(ResourceAccess {
            resource,
            write,
            after_barrier,
        });
    }

    /// Note that `image` is used in `layout`. The first use of an image
    /// becomes the layout expected at submit time.
    pub fn expect_layout(&mut self, image: Handle, layout: vk::ImageLayout) -> Option<vk::ImageLayout> {
        match self.cb.current_layouts.get(&image) {
            Some(&current) if current != layout => Some(current),
            Some(_) => None,
            None => {
                self.cb.initial_layouts.insert(image, layout);
                self.cb.current_layouts.insert(image, layout);
                None
            }
        }
    }

    pub fn outside_render_pass(&mut self) {
        if self.cb.render_pass.is_some() {
            self.usage(
                "CoreValidation-RenderPass-Inside",
                "must not be recorded inside a render pass instance".to_string(),
            );
        }
    }

    /// Usage-flag and memory-binding checks; returns the buffer size.
    fn transfer_buffer(&mut self, buffer: Handle, usage: vk::BufferUsageFlags, arg: &str) -> Option<u64> {
        let state = self.objects.buffers.get(&buffer)?.clone();
        self.reference(buffer);
        if !state.usage.contains(usage) {
            self.usage(
                "CoreValidation-Buffer-Usage",
                format!("{} {} was not created with {:?} usage", arg, buffer, usage),
            )
            .objects
            .push((ObjectType::Buffer, buffer));
        }
        if state.memory.is_none() {
            self.usage(
                "CoreValidation-Buffer-NotBound",
                format!("{} {} is not bound to memory", arg, buffer),
            )
            .objects
            .push((ObjectType::Buffer, buffer));
        } else if state.memory_freed {
            self.usage(
                "CoreValidation-Buffer-MemoryFreed",
                format!("{} {} is bound to memory that has been freed", arg, buffer),
            )
            .objects
            .push((ObjectType::Buffer, buffer));
        }
        Some(state.size)
    }

    fn range_in(&mut self, arg: &str, offset: u64, size: u64, limit: u64) {
        let fits = if size == vk::WHOLE_SIZE {
            offset < limit
        } else {
            offset.checked_add(size).is_some_and(|end| end <= limit)
        };
        if !fits {
            self.usage(
                "CoreValidation-Buffer-OutOfRange",
                format!("{} range offset {} size {} exceeds the buffer size {}", arg, offset, size, limit),
            );
        }
    }
}

/// Validate and record one `vkCmd*` call.
pub(crate) fn record(state: &mut DeviceState, cmd: &VulkanCommand, issues: &mut Vec<Diagnostic>) -> Verdict {
    let entry = cmd.entry_point();
    let Some(handle) = cmd.command_buffer() else {
        return Verdict::Forward;
    };

    let secondaries = match cmd {
        VulkanCommand::CmdExecuteCommands { command_buffers, .. } => command_buffers
            .iter()
            .map(|h| (*h, state.command_buffers.get(h).cloned()))
            .collect(),
        _ => Vec::new(),
    };

    let Some(cb) = state.command_buffers.get_mut(&handle) else {
        issues.push(
            usage_error(
                entry,
                "CoreValidation-CommandBuffer-Unknown",
                format!("command buffer {} was not allocated on this device", handle),
            )
            .with_object(ObjectType::CommandBuffer, handle),
        );
        return Verdict::Suppress;
    };

    if cb.status != CommandBufferStatus::Recording {
        issues.push(
            usage_error(
                entry,
                "CoreValidation-CommandBuffer-NotRecording",
                format!("command buffer {} is {:?}, not recording", handle, cb.status),
            )
            .with_object(ObjectType::CommandBuffer, handle),
        );
        return Verdict::Forward;
    }
    cb.commands.push(entry);

    let mut rec = Recorder {
        entry,
        handle,
        cb,
        objects: &state.objects,
        issues,
        new_refs: Vec::new(),
    };
    record_command(&mut rec, cmd, &secondaries);

    let new_refs = rec.new_refs;
    for object in new_refs {
        state.refs.entry(object).or_default().insert(handle);
    }
    Verdict::Forward
}

fn record_command(rec: &mut Recorder<'_>, cmd: &VulkanCommand, secondaries: &[(Handle, Option<CommandBufferState>)]) {
    match cmd {
        VulkanCommand::CmdBindPipeline {
            pipeline_bind_point,
            pipeline,
            ..
        } => {
            let bind_point = vk::PipelineBindPoint::from_raw(*pipeline_bind_point);
            let Some(state) = rec.objects.pipelines.get(pipeline).cloned() else {
                return;
            };
            rec.reference(*pipeline);
            if state.bind_point != bind_point {
                rec.usage(
                    "CoreValidation-Pipeline-BindPoint",
                    format!("pipeline {} is a {:?} pipeline, bound at {:?}", pipeline, state.bind_point, bind_point),
                )
                .objects
                .push((ObjectType::Pipeline, *pipeline));
            }
            let pipeline_kind = state.bind_point;
            rec.cb.bind_point_mut(pipeline_kind).pipeline = Some((*pipeline, state));
        }
        VulkanCommand::CmdBindDescriptorSets {
            pipeline_bind_point,
            layout,
            first_set,
            descriptor_sets,
            dynamic_offsets,
            ..
        } => descriptor::bind_descriptor_sets(
            rec,
            vk::PipelineBindPoint::from_raw(*pipeline_bind_point),
            *layout,
            *first_set,
            descriptor_sets,
            dynamic_offsets,
        ),
        VulkanCommand::CmdBindVertexBuffers {
            first_binding,
            buffers,
            ..
        } => {
            let objects = rec.objects;
            for (i, &buffer) in buffers.iter().enumerate() {
                rec.reference(buffer);
                if let Some(state) = objects.buffers.get(&buffer) {
                    if !state.usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
                        rec.usage(
                            "CoreValidation-Buffer-Usage",
                            format!("vertex buffer {} was not created with VERTEX_BUFFER usage", buffer),
                        );
                    }
                }
                match u32::try_from(i).ok().and_then(|i| first_binding.checked_add(i)) {
                    Some(binding) => {
                        rec.cb.vertex_buffers.insert(binding, buffer);
                    }
                    None => {
                        rec.usage(
                            "CoreValidation-VertexBuffer-BindingRange",
                            format!(
                                "firstBinding {} + bindingCount {} does not fit in a binding number",
                                first_binding,
                                buffers.len()
                            ),
                        );
                        break;
                    }
                }
            }
        }
        VulkanCommand::CmdBindIndexBuffer { buffer, offset, .. } => {
            rec.reference(*buffer);
            if let Some(state) = rec.objects.buffers.get(buffer).cloned() {
                if !state.usage.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
                    rec.usage(
                        "CoreValidation-Buffer-Usage",
                        format!("index buffer {} was not created with INDEX_BUFFER usage", buffer),
                    );
                }
                if *offset >= state.size {
                    rec.usage(
                        "CoreValidation-Buffer-OutOfRange",
                        format!("offset {} is beyond the index buffer size {}", offset, state.size),
                    );
                }
            }
            rec.cb.index_buffer = Some(*buffer);
        }
        VulkanCommand::CmdSetViewport { .. } => rec.cb.viewport_set = true,
        VulkanCommand::CmdSetScissor { .. } => rec.cb.scissor_set = true,

        VulkanCommand::CmdDraw { .. } => validate_draw(rec, false),
        VulkanCommand::CmdDrawIndexed { .. } => validate_draw(rec, true),
        VulkanCommand::CmdDispatch { .. } => validate_dispatch(rec),

        VulkanCommand::CmdCopyBuffer {
            src_buffer,
            dst_buffer,
            regions,
            ..
        } => record_copy_buffer(rec, *src_buffer, *dst_buffer, regions),
        VulkanCommand::CmdFillBuffer {
            dst_buffer,
            dst_offset,
            size,
            ..
        } => {
            rec.outside_render_pass();
            if let Some(limit) = rec.transfer_buffer(*dst_buffer, vk::BufferUsageFlags::TRANSFER_DST, "dstBuffer") {
                rec.range_in("dstBuffer", *dst_offset, *size, limit);
            }
            rec.access(*dst_buffer, true);
        }
        VulkanCommand::CmdUpdateBuffer {
            dst_buffer,
            dst_offset,
            data,
            ..
        } => {
            rec.outside_render_pass();
            if let Some(limit) = rec.transfer_buffer(*dst_buffer, vk::BufferUsageFlags::TRANSFER_DST, "dstBuffer") {
                rec.range_in("dstBuffer", *dst_offset, data.len() as u64, limit);
            }
            rec.access(*dst_buffer, true);
        }
        VulkanCommand::CmdCopyBufferToImage {
            src_buffer,
            dst_image,
            dst_image_layout,
            regions,
            ..
        } => record_copy_buffer_to_image(rec, *src_buffer, *dst_image, *dst_image_layout, regions),

        VulkanCommand::CmdPipelineBarrier {
            buffer_memory_barriers,
            image_memory_barriers,
            ..
        } => {
            for barrier in buffer_memory_barriers {
                rec.reference(barrier.buffer);
            }
            for barrier in image_memory_barriers {
                record_image_barrier(rec, barrier);
            }
            rec.cb.barrier_recorded = true;
        }

        VulkanCommand::CmdBeginRenderPass {
            render_pass,
            framebuffer,
            render_area,
            ..
        } => render_pass::begin(rec, *render_pass, *framebuffer, render_area),
        VulkanCommand::CmdNextSubpass { .. } => render_pass::next_subpass(rec),
        VulkanCommand::CmdEndRenderPass { .. } => render_pass::end(rec),

        VulkanCommand::CmdExecuteCommands { .. } => record_execute_commands(rec, secondaries),
        _ => {}
    }
}

fn validate_draw(rec: &mut Recorder<'_>, indexed: bool) {
    let scope = rec.cb.render_pass.clone();
    if scope.is_none() {
        rec.usage(
            "CoreValidation-Draw-OutsideRenderPass",
            "must be recorded inside a render pass instance".to_string(),
        );
    }
    let Some((pipeline_handle, pipeline)) = rec.cb.graphics.pipeline.clone() else {
        rec.usage(
            "CoreValidation-Draw-NoPipeline",
            "no graphics pipeline is bound".to_string(),
        );
        return;
    };

    if let (Some(scope), Some((rp_handle, rp))) = (&scope, &pipeline.render_pass) {
        if *rp_handle != scope.render_pass && !rp.is_compatible(&scope.state) {
            rec.usage(
                "CoreValidation-Draw-RenderPassIncompatible",
                format!(
                    "pipeline {} was created for render pass {}, which is not compatible with the active render pass {}",
                    pipeline_handle, rp_handle, scope.render_pass
                ),
            )
            .objects
            .push((ObjectType::Pipeline, pipeline_handle));
        }
        if pipeline.subpass != scope.subpass {
            rec.usage(
                "CoreValidation-Draw-SubpassMismatch",
                format!(
                    "pipeline {} was created for subpass {}, the active subpass is {}",
                    pipeline_handle, pipeline.subpass, scope.subpass
                ),
            );
        }
    }

    descriptor::validate_bound_sets(rec, vk::PipelineBindPoint::GRAPHICS, &pipeline);

    for binding in &pipeline.vertex_bindings {
        match rec.cb.vertex_buffers.get(binding).copied() {
            Some(buffer) => rec.access(buffer, false),
            None => {
                rec.usage(
                    "CoreValidation-Draw-VertexBufferMissing",
                    format!("no vertex buffer is bound at binding {}", binding),
                );
            }
        }
    }
    if indexed {
        match rec.cb.index_buffer {
            Some(buffer) => rec.access(buffer, false),
            None => {
                rec.usage(
                    "CoreValidation-Draw-IndexBufferMissing",
                    "no index buffer is bound".to_string(),
                );
            }
        }
    }
    if pipeline.dynamic_viewport && !rec.cb.viewport_set {
        rec.usage(
            "CoreValidation-Draw-DynamicStateNotSet",
            "the pipeline uses dynamic viewports but vkCmdSetViewport was not recorded".to_string(),
        );
    }
    if pipeline.dynamic_scissor && !rec.cb.scissor_set {
        rec.usage(
            "CoreValidation-Draw-DynamicStateNotSet",
            "the pipeline uses dynamic scissors but vkCmdSetScissor was not recorded".to_string(),
        );
    }
}

fn validate_dispatch(rec: &mut Recorder<'_>) {
    rec.outside_render_pass();
    let Some((_, pipeline)) = rec.cb.compute.pipeline.clone() else {
        rec.usage(
            "CoreValidation-Dispatch-NoPipeline",
            "no compute pipeline is bound".to_string(),
        );
        return;
    };
    descriptor::validate_bound_sets(rec, vk::PipelineBindPoint::COMPUTE, &pipeline);
}

fn record_copy_buffer(rec: &mut Recorder<'_>, src: Handle, dst: Handle, regions: &[BufferCopy]) {
    rec.outside_render_pass();
    let src_size = rec.transfer_buffer(src, vk::BufferUsageFlags::TRANSFER_SRC, "srcBuffer");
    let dst_size = rec.transfer_buffer(dst, vk::BufferUsageFlags::TRANSFER_DST, "dstBuffer");
    for region in regions {
        if let Some(limit) = src_size {
            rec.range_in("srcBuffer", region.src_offset, region.size, limit);
        }
        if let Some(limit) = dst_size {
            rec.range_in("dstBuffer", region.dst_offset, region.size, limit);
        }
    }
    rec.access(src, false);
    rec.access(dst, true);
}

fn record_copy_buffer_to_image(
    rec: &mut Recorder<'_>,
    src: Handle,
    image: Handle,
    layout: i32,
    regions: &[BufferImageCopy],
) {
    rec.outside_render_pass();
    rec.transfer_buffer(src, vk::BufferUsageFlags::TRANSFER_SRC, "srcBuffer");
    rec.access(src, false);

    let Some(state) = rec.objects.images.get(&image).cloned() else {
        return;
    };
    rec.reference(image);
    if !state.usage.contains(vk::ImageUsageFlags::TRANSFER_DST) {
        rec.usage(
            "CoreValidation-Image-Usage",
            format!("dstImage {} was not created with TRANSFER_DST usage", image),
        )
        .objects
        .push((ObjectType::Image, image));
    }
    if state.memory.is_none() {
        rec.usage(
            "CoreValidation-Image-NotBound",
            format!("dstImage {} is not bound to memory", image),
        )
        .objects
        .push((ObjectType::Image, image));
    } else if state.memory_freed {
        rec.usage(
            "CoreValidation-Image-MemoryFreed",
            format!("dstImage {} is bound to memory that has been freed", image),
        )
        .objects
        .push((ObjectType::Image, image));
    }

    let layout = vk::ImageLayout::from_raw(layout);
    if layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL && layout != vk::ImageLayout::GENERAL {
        rec.usage(
            "CoreValidation-Image-Layout",
            format!("dstImageLayout is {:?}, must be TRANSFER_DST_OPTIMAL or GENERAL", layout),
        );
    } else if let Some(current) = rec.expect_layout(image, layout) {
        rec.usage(
            "CoreValidation-Image-Layout",
            format!("dstImage {} is in {:?} at this point, not {:?}", image, current, layout),
        )
        .objects
        .push((ObjectType::Image, image));
    }

    for region in regions {
        let level = region.image_subresource.mip_level;
        if level >= state.mip_levels {
            rec.usage(
                "CoreValidation-Image-OutOfRange",
                format!("mipLevel {} exceeds the image's {} levels", level, state.mip_levels),
            );
            continue;
        }
        let fits = (0..3).all(|axis| {
            let extent = (state.extent[axis] >> level).max(1);
            let offset = region.image_offset[axis];
            offset >= 0 && (offset as u64) + (region.image_extent[axis] as u64) <= extent as u64
        });
        if !fits {
            rec.usage(
                "CoreValidation-Image-OutOfRange",
                format!(
                    "region offset {:?} extent {:?} exceeds the image extent at level {}",
                    region.image_offset, region.image_extent, level
                ),
            );
        }
    }
    rec.access(image, true);
}

fn record_image_barrier(rec: &mut Recorder<'_>, barrier: &ImageMemoryBarrier) {
    let image = barrier.image;
    rec.reference(image);
    let old = vk::ImageLayout::from_raw(barrier.old_layout);
    let new = vk::ImageLayout::from_raw(barrier.new_layout);
    match rec.cb.current_layouts.get(&image).copied() {
        Some(current) if old != vk::ImageLayout::UNDEFINED && old != current => {
            rec.usage(
                "CoreValidation-Barrier-LayoutMismatch",
                format!("image {} is in {:?}, but the barrier's oldLayout is {:?}", image, current, old),
            )
            .objects
            .push((ObjectType::Image, image));
        }
        None if old != vk::ImageLayout::UNDEFINED => {
            rec.cb.initial_layouts.insert(image, old);
        }
        _ => {}
    }
    rec.cb.current_layouts.insert(image, new);
    if old != new {
        rec.access(image, true);
    }
}

fn record_execute_commands(rec: &mut Recorder<'_>, secondaries: &[(Handle, Option<CommandBufferState>)]) {
    if rec.cb.level != vk::CommandBufferLevel::PRIMARY {
        rec.usage(
            "CoreValidation-ExecuteCommands-NotPrimary",
            "must be recorded into a primary command buffer".to_string(),
        );
    }
    for (handle, state) in secondaries {
        rec.reference(*handle);
        let Some(secondary) = state else {
            continue;
        };
        if secondary.level != vk::CommandBufferLevel::SECONDARY {
            rec.usage(
                "CoreValidation-ExecuteCommands-NotSecondary",
                format!("command buffer {} is not a secondary command buffer", handle),
            )
            .objects
            .push((ObjectType::CommandBuffer, *handle));
        }
        if !secondary.is_executable_for_submit() {
            rec.usage(
                "CoreValidation-ExecuteCommands-NotExecutable",
                format!("secondary command buffer {} is {:?}", handle, secondary.status),
            )
            .objects
            .push((ObjectType::CommandBuffer, *handle));
        }

        for (&image, &layout) in &secondary.initial_layouts {
            if let Some(current) = rec.expect_layout(image, layout) {
                rec.usage(
                    "CoreValidation-Image-Layout",
                    format!(
                        "secondary command buffer {} expects image {} in {:?}, but it is in {:?}",
                        handle, image, layout, current
                    ),
                );
            }
        }
        rec.cb
            .current_layouts
            .extend(secondary.current_layouts.iter().map(|(k, v)| (*k, *v)));
        let after_barrier = rec.cb.barrier_recorded;
        rec.cb.accesses.extend(secondary.accesses.iter().map(|a| ResourceAccess {
            after_barrier: a.after_barrier || after_barrier,
            ..*a
        }));
        rec.cb.secondaries.push(*handle);
    }
}

fn command_buffer_diag(entry: EntryPoint, message_id: &'static str, handle: Handle, message: String) -> Diagnostic {
    usage_error(entry, message_id, message).with_object(ObjectType::CommandBuffer, handle)
}

pub(crate) fn validate_begin(
    state: &DeviceState,
    handle: Handle,
    flags: u32,
    inheritance: Option<&CommandBufferInheritanceInfo>,
    issues: &mut Vec<Diagnostic>,
) {
    let entry = EntryPoint::BeginCommandBuffer;
    let Some(cb) = state.command_buffers.get(&handle) else {
        return;
    };
    match cb.status {
        CommandBufferStatus::Recording => issues.push(command_buffer_diag(
            entry,
            "CoreValidation-CommandBuffer-BeginWhileRecording",
            handle,
            format!("command buffer {} is already recording", handle),
        )),
        CommandBufferStatus::Pending => issues.push(command_buffer_diag(
            entry,
            "CoreValidation-CommandBuffer-Pending",
            handle,
            format!("command buffer {} is pending execution", handle),
        )),
        CommandBufferStatus::Executable | CommandBufferStatus::Invalid => {
            if !state.pool_allows_reset(cb.pool) {
                issues.push(command_buffer_diag(
                    entry,
                    "CoreValidation-CommandBuffer-ImplicitReset",
                    handle,
                    format!(
                        "command buffer {} would be implicitly reset, but pool {} lacks RESET_COMMAND_BUFFER",
                        handle, cb.pool
                    ),
                ));
            }
        }
        CommandBufferStatus::Initial => {}
    }

    let flags = vk::CommandBufferUsageFlags::from_raw(flags);
    if cb.level == vk::CommandBufferLevel::SECONDARY
        && flags.contains(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
        && inheritance.map_or(true, |i| i.render_pass.is_null())
    {
        issues.push(command_buffer_diag(
            entry,
            "CoreValidation-CommandBuffer-InheritanceRenderPass",
            handle,
            "RENDER_PASS_CONTINUE requires pInheritanceInfo->renderPass".to_string(),
        ));
    }
}

pub(crate) fn validate_end(state: &DeviceState, handle: Handle, issues: &mut Vec<Diagnostic>) {
    let entry = EntryPoint::EndCommandBuffer;
    let Some(cb) = state.command_buffers.get(&handle) else {
        return;
    };
    if cb.status != CommandBufferStatus::Recording {
        issues.push(command_buffer_diag(
            entry,
            "CoreValidation-CommandBuffer-NotRecording",
            handle,
            format!("command buffer {} is {:?}, not recording", handle, cb.status),
        ));
    } else if cb.render_pass.is_some() && cb.level == vk::CommandBufferLevel::PRIMARY {
        issues.push(command_buffer_diag(
            entry,
            "CoreValidation-CommandBuffer-EndInRenderPass",
            handle,
            "a render pass instance is still active".to_string(),
        ));
    }
}

pub(crate) fn validate_reset(state: &DeviceState, handle: Handle, issues: &mut Vec<Diagnostic>) {
    let entry = EntryPoint::ResetCommandBuffer;
    let Some(cb) = state.command_buffers.get(&handle) else {
        return;
    };
    if !state.pool_allows_reset(cb.pool) {
        issues.push(command_buffer_diag(
            entry,
            "CoreValidation-CommandBuffer-ResetNotAllowed",
            handle,
            format!("pool {} was not created with RESET_COMMAND_BUFFER", cb.pool),
        ));
    }
    if cb.status == CommandBufferStatus::Pending {
        issues.push(command_buffer_diag(
            entry,
            "CoreValidation-CommandBuffer-Pending",
            handle,
            format!("command buffer {} is pending execution", handle),
        ));
    }
}

/// Pending-use checks for calls that free, reset or destroy command buffers.
pub(crate) fn validate_pool_op(state: &DeviceState, cmd: &VulkanCommand, issues: &mut Vec<Diagnostic>) {
    let entry = cmd.entry_point();
    let targets: Vec<Handle> = match cmd {
        VulkanCommand::FreeCommandBuffers { command_buffers, .. } => command_buffers.clone(),
        VulkanCommand::ResetCommandPool { command_pool, .. } | VulkanCommand::DestroyCommandPool { command_pool, .. } => {
            state
                .objects
                .command_pools
                .get(command_pool)
                .map(|pool| pool.command_buffers.iter().copied().collect())
                .unwrap_or_default()
        }
        _ => return,
    };
    let mut pending: Vec<Handle> = targets
        .into_iter()
        .filter(|h| {
            state
                .command_buffers
                .get(h)
                .is_some_and(|cb| cb.status == CommandBufferStatus::Pending)
        })
        .collect();
    pending.sort();
    for handle in pending {
        issues.push(command_buffer_diag(
            entry,
            "CoreValidation-CommandBuffer-Pending",
            handle,
            format!("command buffer {} is pending execution", handle),
        ));
    }
}

/// State transitions after a successful lifecycle call.
pub(crate) fn update(state: &mut DeviceState, cmd: &VulkanCommand, resp: &VulkanResponse) {
    match cmd {
        VulkanCommand::CreateCommandPool {
            flags,
            queue_family_index,
            ..
        } => {
            if let Some(pool) = resp.handle() {
                state.objects.command_pools.insert(
                    pool,
                    CommandPoolState {
                        flags: vk::CommandPoolCreateFlags::from_raw(*flags),
                        queue_family_index: *queue_family_index,
                        command_buffers: HashSet::new(),
                    },
                );
            }
        }
        VulkanCommand::AllocateCommandBuffers {
            command_pool, level, ..
        } => {
            let level = vk::CommandBufferLevel::from_raw(*level);
            for handle in resp.handles() {
                state
                    .command_buffers
                    .insert(handle, CommandBufferState::new(*command_pool, level));
                if let Some(pool) = state.objects.command_pools.get_mut(command_pool) {
                    pool.command_buffers.insert(handle);
                }
            }
        }
        VulkanCommand::BeginCommandBuffer {
            command_buffer, flags, ..
        } => {
            state.unlink(*command_buffer);
            if let Some(cb) = state.command_buffers.get_mut(command_buffer) {
                cb.begin(vk::CommandBufferUsageFlags::from_raw(*flags));
            }
        }
        VulkanCommand::EndCommandBuffer { command_buffer } => {
            if let Some(cb) = state.command_buffers.get_mut(command_buffer) {
                if cb.status == CommandBufferStatus::Recording {
                    cb.status = CommandBufferStatus::Executable;
                }
            }
        }
        VulkanCommand::ResetCommandBuffer { command_buffer, .. } => {
            state.unlink(*command_buffer);
            if let Some(cb) = state.command_buffers.get_mut(command_buffer) {
                cb.reset();
            }
        }
        VulkanCommand::ResetCommandPool { command_pool, .. } => {
            let buffers: Vec<Handle> = state
                .objects
                .command_pools
                .get(command_pool)
                .map(|pool| pool.command_buffers.iter().copied().collect())
                .unwrap_or_default();
            for handle in buffers {
                state.unlink(handle);
                if let Some(cb) = state.command_buffers.get_mut(&handle) {
                    cb.reset();
                }
            }
        }
        VulkanCommand::FreeCommandBuffers {
            command_pool,
            command_buffers,
            ..
        } => {
            for handle in command_buffers {
                state.remove_command_buffer(*handle);
            }
            if let Some(pool) = state.objects.command_pools.get_mut(command_pool) {
                for handle in command_buffers {
                    pool.command_buffers.remove(handle);
                }
            }
        }
        VulkanCommand::DestroyCommandPool { command_pool, .. } => {
            if let Some(pool) = state.objects.command_pools.remove(command_pool) {
                for handle in pool.command_buffers {
                    state.remove_command_buffer(handle);
                }
            }
        }
        _ => {}
    }
}
