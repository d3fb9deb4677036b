//! Shared fixtures: a layer chain over the null driver with one instance,
//! one device and its first queue already set up.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use vkguard_api::vulkan_commands::*;
use vkguard_api::{Handle, VulkanCommand, VulkanResponse};
use vkguard_core::{Diagnostic, ErrorKind, LayerSettings, ReflectError};
use vkguard_layers::shader_validation::{EntryPointReflection, ShaderStage};
use vkguard_layers::{LayerChain, NullDriver, ShaderReflection, ShaderReflector};

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

pub struct Harness {
    pub driver: Arc<NullDriver>,
    pub chain: LayerChain,
    pub seen: Arc<Mutex<Vec<Diagnostic>>>,
    pub instance: Handle,
    pub physical_device: Handle,
    pub device: Handle,
    pub queue: Handle,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(settings(), None)
    }

    pub fn with_settings(settings: LayerSettings) -> Self {
        Self::build(settings, None)
    }

    pub fn with_reflector(reflector: StubReflector) -> Self {
        Self::build(settings(), Some(Arc::new(reflector)))
    }

    pub fn build(settings: LayerSettings, reflector: Option<Arc<dyn ShaderReflector>>) -> Self {
        let driver = NullDriver::new();
        let mut builder = LayerChain::builder(driver.clone()).settings(settings);
        if let Some(reflector) = reflector {
            builder = builder.reflector(reflector);
        }
        let chain = builder.build().expect("layer chain builds over the null driver");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        chain.create_debug_messenger(vkguard_core::MessengerCreateInfo::new(move |d| sink.lock().push(d.clone())));

        let instance = handle_of(chain.call(create_instance()));
        let physical_device = match chain.call(VulkanCommand::EnumeratePhysicalDevices { instance }) {
            VulkanResponse::PhysicalDevices { handles } => handles[0],
            other => panic!("expected PhysicalDevices, got {:?}", other),
        };
        let device = handle_of(chain.call(create_device(physical_device)));
        let queue = handle_of(chain.call(VulkanCommand::GetDeviceQueue {
            device,
            queue_family_index: 0,
            queue_index: 0,
        }));

        Self {
            driver,
            chain,
            seen,
            instance,
            physical_device,
            device,
            queue,
        }
    }

    pub fn call(&self, cmd: VulkanCommand) -> VulkanResponse {
        self.chain.call(cmd)
    }

    /// Message ids reported so far, in order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.seen.lock().iter().map(|d| d.message_id).collect()
    }

    pub fn count(&self, message_id: &str) -> usize {
        self.seen.lock().iter().filter(|d| d.message_id == message_id).count()
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.seen.lock().iter().map(|d| d.kind).collect()
    }

    pub fn find(&self, message_id: &str) -> Option<Diagnostic> {
        self.seen.lock().iter().find(|d| d.message_id == message_id).cloned()
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }

    pub fn queue_at(&self, queue_index: u32) -> Handle {
        handle_of(self.call(VulkanCommand::GetDeviceQueue {
            device: self.device,
            queue_family_index: 0,
            queue_index,
        }))
    }

    pub fn allocate_memory(&self, size: u64) -> Handle {
        handle_of(self.call(VulkanCommand::AllocateMemory {
            device: self.device,
            p_next: vec![],
            allocation_size: size,
            memory_type_index: 0,
        }))
    }

    pub fn create_unbound_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> Handle {
        handle_of(self.call(VulkanCommand::CreateBuffer {
            device: self.device,
            create_info: BufferCreateInfo {
                size,
                usage: usage.as_raw(),
                sharing_mode: vk::SharingMode::EXCLUSIVE.as_raw(),
                ..Default::default()
            },
        }))
    }

    /// A buffer with its own memory bound at offset 0.
    pub fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> Handle {
        let buffer = self.create_unbound_buffer(size, usage);
        let memory = self.allocate_memory(size);
        let resp = self.call(VulkanCommand::BindBufferMemory {
            device: self.device,
            buffer,
            memory,
            memory_offset: 0,
        });
        assert!(resp.is_success(), "bind failed: {:?}", resp);
        buffer
    }

    pub fn destroy_buffer(&self, buffer: Handle) -> VulkanResponse {
        self.call(VulkanCommand::DestroyBuffer {
            device: self.device,
            buffer,
        })
    }

    pub fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags) -> Handle {
        handle_of(self.call(VulkanCommand::CreateCommandPool {
            device: self.device,
            flags: flags.as_raw(),
            queue_family_index: 0,
        }))
    }

    pub fn allocate_command_buffer(&self, pool: Handle, level: vk::CommandBufferLevel) -> Handle {
        match self.call(VulkanCommand::AllocateCommandBuffers {
            device: self.device,
            command_pool: pool,
            level: level.as_raw(),
            count: 1,
        }) {
            VulkanResponse::CommandBuffersAllocated { handles } => handles[0],
            other => panic!("expected CommandBuffersAllocated, got {:?}", other),
        }
    }

    /// A primary command buffer from a pool that allows individual resets.
    pub fn primary_command_buffer(&self) -> Handle {
        let pool = self.create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        self.allocate_command_buffer(pool, vk::CommandBufferLevel::PRIMARY)
    }

    pub fn begin(&self, command_buffer: Handle, flags: vk::CommandBufferUsageFlags) -> VulkanResponse {
        self.call(VulkanCommand::BeginCommandBuffer {
            command_buffer,
            flags: flags.as_raw(),
            inheritance: None,
        })
    }

    pub fn end(&self, command_buffer: Handle) -> VulkanResponse {
        self.call(VulkanCommand::EndCommandBuffer { command_buffer })
    }

    pub fn fill(&self, command_buffer: Handle, buffer: Handle) -> VulkanResponse {
        self.call(VulkanCommand::CmdFillBuffer {
            command_buffer,
            dst_buffer: buffer,
            dst_offset: 0,
            size: vk::WHOLE_SIZE,
            data: 0,
        })
    }

    /// Record a single fill of `buffer` into a fresh primary command buffer.
    pub fn recorded_fill(&self, buffer: Handle) -> Handle {
        let cb = self.primary_command_buffer();
        self.begin(cb, vk::CommandBufferUsageFlags::empty());
        self.fill(cb, buffer);
        self.end(cb);
        cb
    }

    pub fn submit(&self, queue: Handle, submits: Vec<SubmitInfo>, fence: Handle) -> VulkanResponse {
        self.call(VulkanCommand::QueueSubmit { queue, submits, fence })
    }

    pub fn submit_one(&self, queue: Handle, command_buffer: Handle, fence: Handle) -> VulkanResponse {
        self.submit(
            queue,
            vec![SubmitInfo {
                command_buffers: vec![command_buffer],
                ..Default::default()
            }],
            fence,
        )
    }

    pub fn create_fence(&self, signaled: bool) -> Handle {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        handle_of(self.call(VulkanCommand::CreateFence {
            device: self.device,
            flags: flags.as_raw(),
        }))
    }

    pub fn create_semaphore(&self) -> Handle {
        handle_of(self.call(VulkanCommand::CreateSemaphore { device: self.device }))
    }

    pub fn create_set_layout(&self, bindings: &[(u32, vk::DescriptorType)]) -> Handle {
        handle_of(self.call(VulkanCommand::CreateDescriptorSetLayout {
            device: self.device,
            flags: 0,
            bindings: bindings
                .iter()
                .map(|&(binding, descriptor_type)| DescriptorSetLayoutBinding {
                    binding,
                    descriptor_type: descriptor_type.as_raw(),
                    descriptor_count: 1,
                    stage_flags: vk::ShaderStageFlags::ALL_GRAPHICS.as_raw(),
                    immutable_samplers: vec![],
                })
                .collect(),
        }))
    }

    pub fn create_pipeline_layout(&self, set_layouts: Vec<Handle>) -> Handle {
        handle_of(self.call(VulkanCommand::CreatePipelineLayout {
            device: self.device,
            set_layouts,
            push_constant_ranges: vec![],
        }))
    }

    pub fn create_descriptor_pool(&self) -> Handle {
        handle_of(self.call(VulkanCommand::CreateDescriptorPool {
            device: self.device,
            flags: vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET.as_raw(),
            max_sets: 16,
            pool_sizes: vec![
                DescriptorPoolSize {
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER.as_raw(),
                    descriptor_count: 32,
                },
                DescriptorPoolSize {
                    descriptor_type: vk::DescriptorType::STORAGE_BUFFER.as_raw(),
                    descriptor_count: 32,
                },
            ],
        }))
    }

    pub fn allocate_set(&self, pool: Handle, layout: Handle) -> Handle {
        match self.call(VulkanCommand::AllocateDescriptorSets {
            device: self.device,
            descriptor_pool: pool,
            set_layouts: vec![layout],
        }) {
            VulkanResponse::DescriptorSetsAllocated { handles } => handles[0],
            other => panic!("expected DescriptorSetsAllocated, got {:?}", other),
        }
    }

    pub fn create_shader_module(&self, id: u32) -> Handle {
        handle_of(self.call(VulkanCommand::CreateShaderModule {
            device: self.device,
            code: fake_spirv(id),
        }))
    }

    /// One color attachment, one graphics subpass writing it.
    pub fn create_render_pass(&self) -> Handle {
        handle_of(self.call(VulkanCommand::CreateRenderPass {
            device: self.device,
            create_info: single_color_render_pass(),
        }))
    }
}

/// Default settings with the duplicate limit lifted, so every finding
/// reaches the collector.
pub fn settings() -> LayerSettings {
    let mut settings = LayerSettings::default();
    settings.report.duplicate_message_limit = 0;
    settings
}

pub fn handle_of(resp: VulkanResponse) -> Handle {
    match resp.handle() {
        Some(handle) => handle,
        None => panic!("expected a created handle, got {:?}", resp),
    }
}

pub fn create_instance() -> VulkanCommand {
    VulkanCommand::CreateInstance {
        p_next: vec![],
        app_name: Some("vkguard-tests".to_string()),
        api_version: vk::API_VERSION_1_0,
        enabled_layers: vec![],
        enabled_extensions: vec![],
    }
}

/// One queue family with two queues.
pub fn create_device(physical_device: Handle) -> VulkanCommand {
    VulkanCommand::CreateDevice {
        physical_device,
        p_next: vec![],
        queue_create_infos: vec![DeviceQueueCreateInfo {
            queue_family_index: 0,
            queue_priorities: vec![1.0, 1.0],
        }],
        enabled_extensions: vec![],
    }
}

pub fn single_color_render_pass() -> RenderPassCreateInfo {
    RenderPassCreateInfo {
        attachments: vec![AttachmentDescription {
            format: vk::Format::R8G8B8A8_UNORM.as_raw(),
            samples: vk::SampleCountFlags::TYPE_1.as_raw(),
            load_op: vk::AttachmentLoadOp::CLEAR.as_raw(),
            store_op: vk::AttachmentStoreOp::STORE.as_raw(),
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE.as_raw(),
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE.as_raw(),
            initial_layout: vk::ImageLayout::UNDEFINED.as_raw(),
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL.as_raw(),
        }],
        subpasses: vec![SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS.as_raw(),
            input_attachments: vec![],
            color_attachments: vec![AttachmentReference {
                attachment: 0,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL.as_raw(),
            }],
            resolve_attachments: vec![],
            depth_stencil_attachment: None,
            preserve_attachments: vec![],
        }],
        dependencies: vec![],
    }
}

pub fn stage(stage: vk::ShaderStageFlags, module: Handle) -> PipelineShaderStageCreateInfo {
    PipelineShaderStageCreateInfo {
        stage: stage.as_raw(),
        module,
        entry_point: "main".to_string(),
    }
}

/// A triangle-list pipeline without vertex buffers.
pub fn graphics_pipeline(
    stages: Vec<PipelineShaderStageCreateInfo>,
    layout: Handle,
    render_pass: Handle,
) -> GraphicsPipelineCreateInfo {
    GraphicsPipelineCreateInfo {
        p_next: vec![],
        flags: 0,
        stages,
        vertex_input: VertexInputState::default(),
        input_assembly: InputAssemblyState {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST.as_raw(),
            primitive_restart_enable: false,
        },
        viewport_state: Some(ViewportState {
            viewport_count: 1,
            scissor_count: 1,
        }),
        rasterization: RasterizationState {
            polygon_mode: vk::PolygonMode::FILL.as_raw(),
            cull_mode: vk::CullModeFlags::BACK.as_raw(),
            front_face: vk::FrontFace::COUNTER_CLOCKWISE.as_raw(),
            line_width: 1.0,
        },
        multisample: Some(MultisampleState {
            rasterization_samples: vk::SampleCountFlags::TYPE_1.as_raw(),
        }),
        depth_stencil: None,
        color_blend_attachments: vec![],
        dynamic_states: vec![],
        layout,
        render_pass,
        subpass: 0,
    }
}

/// Module bytes that pass the structural checks; word 1 names the module
/// for [`StubReflector`].
pub fn fake_spirv(id: u32) -> Vec<u8> {
    [SPIRV_MAGIC, id, 0, 0, 0]
        .iter()
        .flat_map(|w| w.to_ne_bytes())
        .collect()
}

pub fn entry(stage: ShaderStage) -> EntryPointReflection {
    EntryPointReflection {
        name: "main".to_string(),
        stage,
        inputs: vec![],
        outputs: vec![],
        resources: vec![],
    }
}

/// Reflection keyed by the id baked into [`fake_spirv`].
#[derive(Default)]
pub struct StubReflector {
    modules: HashMap<u32, ShaderReflection>,
}

impl StubReflector {
    pub fn module(mut self, id: u32, entry_points: Vec<EntryPointReflection>) -> Self {
        self.modules.insert(id, ShaderReflection { entry_points });
        self
    }
}

impl ShaderReflector for StubReflector {
    fn reflect(&self, code: &[u32]) -> Result<ShaderReflection, ReflectError> {
        code.get(1)
            .and_then(|id| self.modules.get(id))
            .cloned()
            .ok_or_else(|| ReflectError::Parse("no stub reflection for module".to_string()))
    }
}
