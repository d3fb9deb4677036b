//! Shadow copies of a device's objects, as far as validation needs them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use ash::vk;
use vkguard_api::vulkan_commands::*;
use vkguard_api::{EntryPoint, Handle, ObjectType, VulkanCommand, VulkanResponse};
use vkguard_core::Diagnostic;

use super::command_buffer::CommandPoolState;
use super::render_pass::{FramebufferState, RenderPassState};
use super::submit::{FenceState, SemaphoreState};
use super::usage_error;
use crate::shader_validation::ShaderReflection;

#[derive(Debug, Clone)]
pub struct BufferState {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    /// Bound memory and offset.
    pub memory: Option<(Handle, u64)>,
    /// The bound memory has since been freed.
    pub memory_freed: bool,
}

#[derive(Debug, Clone)]
pub struct ImageState {
    pub format: vk::Format,
    pub extent: [u32; 3],
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: vk::ImageUsageFlags,
    pub memory: Option<(Handle, u64)>,
    pub memory_freed: bool,
}

#[derive(Debug, Clone)]
pub struct ImageViewState {
    pub image: Handle,
    pub format: vk::Format,
}

#[derive(Debug, Clone)]
pub struct MemoryState {
    pub size: u64,
    /// Mapped offset and size.
    pub mapped: Option<(u64, u64)>,
}

pub struct ShaderModuleState {
    pub words: Arc<[u32]>,
    pub reflection: Option<Result<Arc<ShaderReflection>, String>>,
}

/// One binding slot of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

impl fmt::Display for LayoutBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}] stages {:?}", self.descriptor_type, self.count, self.stage_flags)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetLayoutState {
    pub bindings: BTreeMap<u32, LayoutBinding>,
}

impl SetLayoutState {
    pub fn from_bindings(bindings: &[DescriptorSetLayoutBinding]) -> Self {
        Self {
            bindings: bindings
                .iter()
                .filter(|b| b.descriptor_count > 0)
                .map(|b| {
                    (
                        b.binding,
                        LayoutBinding {
                            descriptor_type: vk::DescriptorType::from_raw(b.descriptor_type),
                            count: b.descriptor_count,
                            stage_flags: vk::ShaderStageFlags::from_raw(b.stage_flags),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Number of dynamic offsets a set of this layout consumes.
    pub fn dynamic_count(&self) -> u32 {
        self.bindings
            .values()
            .filter(|b| {
                matches!(
                    b.descriptor_type,
                    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
                )
            })
            .map(|b| b.count)
            .sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutState {
    pub set_layouts: Vec<(Handle, Arc<SetLayoutState>)>,
}

#[derive(Debug, Clone)]
pub struct PipelineState {
    pub bind_point: vk::PipelineBindPoint,
    pub layout: Handle,
    pub layout_state: Arc<PipelineLayoutState>,
    pub render_pass: Option<(Handle, Arc<RenderPassState>)>,
    pub subpass: u32,
    pub vertex_bindings: Vec<u32>,
    pub dynamic_viewport: bool,
    pub dynamic_scissor: bool,
    /// `(set, binding)` statically used by the pipeline's shaders.
    pub used_bindings: Vec<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct DescriptorPoolState {
    pub flags: vk::DescriptorPoolCreateFlags,
    pub max_sets: u32,
    pub sets: HashSet<Handle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescriptorResource {
    Buffer { buffer: Handle, offset: u64, range: u64 },
    Image { image_view: Handle, sampler: Handle, layout: vk::ImageLayout },
}

#[derive(Debug, Clone)]
pub struct DescriptorSetState {
    pub pool: Handle,
    pub layout: Handle,
    pub layout_state: Arc<SetLayoutState>,
    /// binding -> array element -> resource
    pub written: BTreeMap<u32, BTreeMap<u32, DescriptorResource>>,
}

impl DescriptorSetState {
    pub fn is_written(&self, binding: u32) -> bool {
        self.written.get(&binding).is_some_and(|elements| !elements.is_empty())
    }
}

/// Every non-dispatchable object of one device.
#[derive(Default)]
pub struct Objects {
    pub buffers: HashMap<Handle, BufferState>,
    pub images: HashMap<Handle, ImageState>,
    pub image_views: HashMap<Handle, ImageViewState>,
    pub samplers: HashSet<Handle>,
    pub memory: HashMap<Handle, MemoryState>,
    pub shader_modules: HashMap<Handle, ShaderModuleState>,
    pub set_layouts: HashMap<Handle, Arc<SetLayoutState>>,
    pub pipeline_layouts: HashMap<Handle, Arc<PipelineLayoutState>>,
    pub pipelines: HashMap<Handle, Arc<PipelineState>>,
    pub descriptor_pools: HashMap<Handle, DescriptorPoolState>,
    pub descriptor_sets: HashMap<Handle, DescriptorSetState>,
    pub render_passes: HashMap<Handle, Arc<RenderPassState>>,
    pub framebuffers: HashMap<Handle, FramebufferState>,
    pub command_pools: HashMap<Handle, CommandPoolState>,
    pub fences: HashMap<Handle, FenceState>,
    pub semaphores: HashMap<Handle, SemaphoreState>,
}

impl Objects {
    /// The image behind a view.
    pub fn image_of_view(&self, image_view: Handle) -> Option<Handle> {
        self.image_views.get(&image_view).map(|v| v.image)
    }

    /// Shadow the objects a successful create call returned. Pipelines,
    /// descriptor sets and command buffers are handled by their own modules.
    pub fn record_created(&mut self, cmd: &VulkanCommand, resp: &VulkanResponse) {
        let Some(handle) = resp.handle() else {
            return;
        };
        match cmd {
            VulkanCommand::AllocateMemory { allocation_size, .. } => {
                self.memory.insert(
                    handle,
                    MemoryState {
                        size: *allocation_size,
                        mapped: None,
                    },
                );
            }
            VulkanCommand::CreateBuffer { create_info, .. } => {
                self.buffers.insert(
                    handle,
                    BufferState {
                        size: create_info.size,
                        usage: vk::BufferUsageFlags::from_raw(create_info.usage),
                        memory: None,
                        memory_freed: false,
                    },
                );
            }
            VulkanCommand::CreateImage { create_info, .. } => {
                self.images.insert(
                    handle,
                    ImageState {
                        format: vk::Format::from_raw(create_info.format),
                        extent: create_info.extent,
                        mip_levels: create_info.mip_levels,
                        array_layers: create_info.array_layers,
                        usage: vk::ImageUsageFlags::from_raw(create_info.usage),
                        memory: None,
                        memory_freed: false,
                    },
                );
            }
            VulkanCommand::CreateImageView { create_info, .. } => {
                self.image_views.insert(
                    handle,
                    ImageViewState {
                        image: create_info.image,
                        format: vk::Format::from_raw(create_info.format),
                    },
                );
            }
            VulkanCommand::CreateSampler { .. } => {
                self.samplers.insert(handle);
            }
            VulkanCommand::CreateShaderModule { code, .. } => {
                let words = crate::shader_validation::words_from_bytes(code).unwrap_or_default();
                self.shader_modules.insert(
                    handle,
                    ShaderModuleState {
                        words: words.into(),
                        reflection: None,
                    },
                );
            }
            VulkanCommand::CreateDescriptorSetLayout { bindings, .. } => {
                self.set_layouts
                    .insert(handle, Arc::new(SetLayoutState::from_bindings(bindings)));
            }
            VulkanCommand::CreatePipelineLayout { set_layouts, .. } => {
                let set_layouts = set_layouts
                    .iter()
                    .map(|&layout| {
                        let state = self.set_layouts.get(&layout).cloned().unwrap_or_default();
                        (layout, state)
                    })
                    .collect();
                self.pipeline_layouts
                    .insert(handle, Arc::new(PipelineLayoutState { set_layouts }));
            }
            VulkanCommand::CreateDescriptorPool { flags, max_sets, .. } => {
                self.descriptor_pools.insert(
                    handle,
                    DescriptorPoolState {
                        flags: vk::DescriptorPoolCreateFlags::from_raw(*flags),
                        max_sets: *max_sets,
                        sets: HashSet::new(),
                    },
                );
            }
            VulkanCommand::CreateRenderPass { create_info, .. } => {
                self.render_passes
                    .insert(handle, Arc::new(RenderPassState::from_create_info(create_info)));
            }
            VulkanCommand::CreateFramebuffer { create_info, .. } => {
                if let Some(render_pass) = self.render_passes.get(&create_info.render_pass) {
                    self.framebuffers.insert(
                        handle,
                        FramebufferState {
                            render_pass: create_info.render_pass,
                            render_pass_state: render_pass.clone(),
                            attachments: create_info.attachments.clone(),
                            extent: [create_info.width, create_info.height, create_info.layers],
                        },
                    );
                }
            }
            VulkanCommand::CreateFence { flags, .. } => {
                let signaled = vk::FenceCreateFlags::from_raw(*flags).contains(vk::FenceCreateFlags::SIGNALED);
                self.fences.insert(handle, FenceState::new(signaled));
            }
            VulkanCommand::CreateSemaphore { .. } => {
                self.semaphores.insert(handle, SemaphoreState::default());
            }
            _ => {}
        }
    }

    /// Drop the shadow of an object a destroy call removed.
    pub fn record_destroyed(&mut self, cmd: &VulkanCommand) {
        match cmd {
            VulkanCommand::FreeMemory { memory, .. } => {
                self.memory.remove(memory);
                let bound_here = |bound: &Option<(Handle, u64)>| matches!(bound, Some((m, _)) if m == memory);
                for buffer in self.buffers.values_mut().filter(|b| bound_here(&b.memory)) {
                    buffer.memory_freed = true;
                }
                for image in self.images.values_mut().filter(|i| bound_here(&i.memory)) {
                    image.memory_freed = true;
                }
            }
            VulkanCommand::DestroyBuffer { buffer, .. } => {
                self.buffers.remove(buffer);
            }
            VulkanCommand::DestroyImage { image, .. } => {
                self.images.remove(image);
            }
            VulkanCommand::DestroyImageView { image_view, .. } => {
                self.image_views.remove(image_view);
            }
            VulkanCommand::DestroySampler { sampler, .. } => {
                self.samplers.remove(sampler);
            }
            VulkanCommand::DestroyShaderModule { shader_module, .. } => {
                self.shader_modules.remove(shader_module);
            }
            VulkanCommand::DestroyDescriptorSetLayout { layout, .. } => {
                self.set_layouts.remove(layout);
            }
            VulkanCommand::DestroyPipelineLayout { layout, .. } => {
                self.pipeline_layouts.remove(layout);
            }
            VulkanCommand::DestroyPipeline { pipeline, .. } => {
                self.pipelines.remove(pipeline);
            }
            VulkanCommand::DestroyRenderPass { render_pass, .. } => {
                self.render_passes.remove(render_pass);
            }
            VulkanCommand::DestroyFramebuffer { framebuffer, .. } => {
                self.framebuffers.remove(framebuffer);
            }
            VulkanCommand::DestroyFence { fence, .. } => {
                self.fences.remove(fence);
            }
            VulkanCommand::DestroySemaphore { semaphore, .. } => {
                self.semaphores.remove(semaphore);
            }
            _ => {}
        }
    }

    /// Memory binding and mapping checks.
    pub fn validate_memory(&self, cmd: &VulkanCommand, issues: &mut Vec<Diagnostic>) {
        let entry = cmd.entry_point();
        match cmd {
            VulkanCommand::MapMemory {
                memory, offset, size, ..
            } => {
                let Some(state) = self.memory.get(memory) else {
                    return;
                };
                if state.mapped.is_some() {
                    issues.push(
                        usage_error(entry, "CoreValidation-Memory-AlreadyMapped", format!("memory {} is already mapped", memory))
                            .with_object(ObjectType::DeviceMemory, *memory),
                    );
                }
                let in_range = *offset < state.size
                    && (*size == vk::WHOLE_SIZE || offset.checked_add(*size).is_some_and(|end| end <= state.size));
                if !in_range {
                    issues.push(
                        usage_error(
                            entry,
                            "CoreValidation-Memory-OffsetOutOfRange",
                            format!(
                                "range offset {} size {} exceeds the allocation size {}",
                                offset, size, state.size
                            ),
                        )
                        .with_object(ObjectType::DeviceMemory, *memory),
                    );
                }
            }
            VulkanCommand::UnmapMemory { memory, .. } => {
                if self.memory.get(memory).is_some_and(|m| m.mapped.is_none()) {
                    issues.push(
                        usage_error(entry, "CoreValidation-Memory-NotMapped", format!("memory {} is not mapped", memory))
                            .with_object(ObjectType::DeviceMemory, *memory),
                    );
                }
            }
            VulkanCommand::BindBufferMemory {
                buffer,
                memory,
                memory_offset,
                ..
            } => {
                let Some(state) = self.buffers.get(buffer) else {
                    return;
                };
                self.check_bind(
                    entry,
                    (ObjectType::Buffer, *buffer),
                    state.memory.is_some(),
                    state.size,
                    *memory,
                    *memory_offset,
                    issues,
                );
            }
            VulkanCommand::BindImageMemory {
                image,
                memory,
                memory_offset,
                ..
            } => {
                let Some(state) = self.images.get(image) else {
                    return;
                };
                self.check_bind(
                    entry,
                    (ObjectType::Image, *image),
                    state.memory.is_some(),
                    0,
                    *memory,
                    *memory_offset,
                    issues,
                );
            }
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_bind(
        &self,
        entry: EntryPoint,
        (object_type, handle): (ObjectType, Handle),
        already_bound: bool,
        size: u64,
        memory: Handle,
        offset: u64,
        issues: &mut Vec<Diagnostic>,
    ) {
        if already_bound {
            issues.push(
                usage_error(
                    entry,
                    "CoreValidation-Memory-AlreadyBound",
                    format!("{} {} is already bound to memory", object_type.type_name(), handle),
                )
                .with_object(object_type, handle),
            );
        }
        let Some(allocation) = self.memory.get(&memory) else {
            return;
        };
        if offset >= allocation.size || offset.saturating_add(size) > allocation.size {
            issues.push(
                usage_error(
                    entry,
                    "CoreValidation-Memory-OffsetOutOfRange",
                    format!(
                        "memoryOffset {} with size {} does not fit the allocation size {}",
                        offset, size, allocation.size
                    ),
                )
                .with_object(object_type, handle)
                .with_object(ObjectType::DeviceMemory, memory),
            );
        }
    }

    pub fn record_memory(&mut self, cmd: &VulkanCommand) {
        match cmd {
            VulkanCommand::MapMemory {
                memory, offset, size, ..
            } => {
                if let Some(state) = self.memory.get_mut(memory) {
                    state.mapped = Some((*offset, *size));
                }
            }
            VulkanCommand::UnmapMemory { memory, .. } => {
                if let Some(state) = self.memory.get_mut(memory) {
                    state.mapped = None;
                }
            }
            VulkanCommand::BindBufferMemory {
                buffer,
                memory,
                memory_offset,
                ..
            } => {
                if let Some(state) = self.buffers.get_mut(buffer) {
                    state.memory = Some((*memory, *memory_offset));
                }
            }
            VulkanCommand::BindImageMemory {
                image,
                memory,
                memory_offset,
                ..
            } => {
                if let Some(state) = self.images.get_mut(image) {
                    state.memory = Some((*memory, *memory_offset));
                }
            }
            _ => {}
        }
    }
}
