use ash::vk;
use serde::{Deserialize, Serialize};

use crate::entry_point::EntryPoint;
use crate::handle::{Handle, ObjectType};

// ============================================================================
// Argument structures
//
// Enumerations are carried as the raw `i32` and flags as the raw `u32` that
// `ash` exposes through `as_raw()`, so out-of-range values survive until the
// parameter validator looks at them.
// ============================================================================

/// One structure in a `pNext` extension chain, identified by its `sType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainedStruct {
    pub s_type: i32,
}

impl ChainedStruct {
    pub fn new(s_type: vk::StructureType) -> Self {
        Self { s_type: s_type.as_raw() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceQueueCreateInfo {
    pub queue_family_index: u32,
    pub queue_priorities: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BufferCreateInfo {
    #[serde(default)]
    pub p_next: Vec<ChainedStruct>,
    pub flags: u32,
    pub size: u64,
    pub usage: u32,
    pub sharing_mode: i32,
    #[serde(default)]
    pub queue_family_indices: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCreateInfo {
    #[serde(default)]
    pub p_next: Vec<ChainedStruct>,
    pub flags: u32,
    pub image_type: i32,
    pub format: i32,
    pub extent: [u32; 3],
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: u32,
    pub tiling: i32,
    pub usage: u32,
    pub sharing_mode: i32,
    #[serde(default)]
    pub queue_family_indices: Vec<u32>,
    pub initial_layout: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSubresourceRange {
    pub aspect_mask: u32,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageViewCreateInfo {
    pub image: Handle,
    pub view_type: i32,
    pub format: i32,
    pub subresource_range: ImageSubresourceRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerCreateInfo {
    pub mag_filter: i32,
    pub min_filter: i32,
    pub mipmap_mode: i32,
    pub address_mode_u: i32,
    pub address_mode_v: i32,
    pub address_mode_w: i32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: i32,
    pub min_lod: f32,
    pub max_lod: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: i32,
    pub descriptor_count: u32,
    pub stage_flags: u32,
    #[serde(default)]
    pub immutable_samplers: Vec<Handle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConstantRange {
    pub stage_flags: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineShaderStageCreateInfo {
    pub stage: u32,
    pub module: Handle,
    pub entry_point: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputePipelineCreateInfo {
    pub flags: u32,
    pub stage: PipelineShaderStageCreateInfo,
    pub layout: Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexInputBindingDescription {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexInputAttributeDescription {
    pub location: u32,
    pub binding: u32,
    pub format: i32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VertexInputState {
    pub bindings: Vec<VertexInputBindingDescription>,
    pub attributes: Vec<VertexInputAttributeDescription>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAssemblyState {
    pub topology: i32,
    pub primitive_restart_enable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportState {
    pub viewport_count: u32,
    pub scissor_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterizationState {
    pub polygon_mode: i32,
    pub cull_mode: u32,
    pub front_face: i32,
    pub line_width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisampleState {
    pub rasterization_samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorBlendAttachmentState {
    pub blend_enable: bool,
    pub src_color_blend_factor: i32,
    pub dst_color_blend_factor: i32,
    pub color_blend_op: i32,
    pub src_alpha_blend_factor: i32,
    pub dst_alpha_blend_factor: i32,
    pub alpha_blend_op: i32,
    pub color_write_mask: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicsPipelineCreateInfo {
    #[serde(default)]
    pub p_next: Vec<ChainedStruct>,
    pub flags: u32,
    pub stages: Vec<PipelineShaderStageCreateInfo>,
    pub vertex_input: VertexInputState,
    pub input_assembly: InputAssemblyState,
    pub viewport_state: Option<ViewportState>,
    pub rasterization: RasterizationState,
    pub multisample: Option<MultisampleState>,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_blend_attachments: Vec<ColorBlendAttachmentState>,
    #[serde(default)]
    pub dynamic_states: Vec<i32>,
    pub layout: Handle,
    pub render_pass: Handle,
    pub subpass: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorPoolSize {
    pub descriptor_type: i32,
    pub descriptor_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorBufferInfo {
    pub buffer: Handle,
    pub offset: u64,
    pub range: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorImageInfo {
    pub sampler: Handle,
    pub image_view: Handle,
    pub image_layout: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteDescriptorSet {
    pub dst_set: Handle,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub descriptor_count: u32,
    pub descriptor_type: i32,
    #[serde(default)]
    pub image_infos: Vec<DescriptorImageInfo>,
    #[serde(default)]
    pub buffer_infos: Vec<DescriptorBufferInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescription {
    pub format: i32,
    pub samples: u32,
    pub load_op: i32,
    pub store_op: i32,
    pub stencil_load_op: i32,
    pub stencil_store_op: i32,
    pub initial_layout: i32,
    pub final_layout: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentReference {
    pub attachment: u32,
    pub layout: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubpassDescription {
    pub pipeline_bind_point: i32,
    #[serde(default)]
    pub input_attachments: Vec<AttachmentReference>,
    #[serde(default)]
    pub color_attachments: Vec<AttachmentReference>,
    #[serde(default)]
    pub resolve_attachments: Vec<AttachmentReference>,
    pub depth_stencil_attachment: Option<AttachmentReference>,
    #[serde(default)]
    pub preserve_attachments: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage_mask: u32,
    pub dst_stage_mask: u32,
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
    pub dependency_flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPassCreateInfo {
    pub attachments: Vec<AttachmentDescription>,
    pub subpasses: Vec<SubpassDescription>,
    #[serde(default)]
    pub dependencies: Vec<SubpassDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramebufferCreateInfo {
    pub render_pass: Handle,
    pub attachments: Vec<Handle>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubmitInfo {
    #[serde(default)]
    pub wait_semaphores: Vec<Handle>,
    #[serde(default)]
    pub wait_dst_stage_masks: Vec<u32>,
    #[serde(default)]
    pub command_buffers: Vec<Handle>,
    #[serde(default)]
    pub signal_semaphores: Vec<Handle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBufferInheritanceInfo {
    pub render_pass: Handle,
    pub subpass: u32,
    pub framebuffer: Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSubresourceLayers {
    pub aspect_mask: u32,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub buffer_row_length: u32,
    pub buffer_image_height: u32,
    pub image_subresource: ImageSubresourceLayers,
    pub image_offset: [i32; 3],
    pub image_extent: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBarrier {
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferMemoryBarrier {
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
    pub buffer: Handle,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMemoryBarrier {
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
    pub old_layout: i32,
    pub new_layout: i32,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
    pub image: Handle,
    pub subresource_range: ImageSubresourceRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect2D {
    pub offset: [i32; 2],
    pub extent: [u32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearValue {
    pub data: [u32; 4],
}

// ============================================================================
// Vulkan Commands (application → driver)
// ============================================================================

/// One intercepted API call with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VulkanCommand {
    // ── Instance ────────────────────────────────────────────
    CreateInstance {
        #[serde(default)]
        p_next: Vec<ChainedStruct>,
        app_name: Option<String>,
        api_version: u32,
        #[serde(default)]
        enabled_layers: Vec<String>,
        #[serde(default)]
        enabled_extensions: Vec<String>,
    },
    DestroyInstance {
        instance: Handle,
    },
    EnumeratePhysicalDevices {
        instance: Handle,
    },

    // ── Logical Device ──────────────────────────────────────
    CreateDevice {
        physical_device: Handle,
        #[serde(default)]
        p_next: Vec<ChainedStruct>,
        queue_create_infos: Vec<DeviceQueueCreateInfo>,
        #[serde(default)]
        enabled_extensions: Vec<String>,
    },
    DestroyDevice {
        device: Handle,
    },
    GetDeviceQueue {
        device: Handle,
        queue_family_index: u32,
        queue_index: u32,
    },
    DeviceWaitIdle {
        device: Handle,
    },

    // ── Queue ───────────────────────────────────────────────
    QueueSubmit {
        queue: Handle,
        submits: Vec<SubmitInfo>,
        fence: Handle,
    },
    QueueWaitIdle {
        queue: Handle,
    },

    // ── Memory ──────────────────────────────────────────────
    AllocateMemory {
        device: Handle,
        #[serde(default)]
        p_next: Vec<ChainedStruct>,
        allocation_size: u64,
        memory_type_index: u32,
    },
    FreeMemory {
        device: Handle,
        memory: Handle,
    },
    MapMemory {
        device: Handle,
        memory: Handle,
        offset: u64,
        size: u64,
        flags: u32,
    },
    UnmapMemory {
        device: Handle,
        memory: Handle,
    },

    // ── Buffer ──────────────────────────────────────────────
    CreateBuffer {
        device: Handle,
        create_info: BufferCreateInfo,
    },
    DestroyBuffer {
        device: Handle,
        buffer: Handle,
    },
    BindBufferMemory {
        device: Handle,
        buffer: Handle,
        memory: Handle,
        memory_offset: u64,
    },

    // ── Image ───────────────────────────────────────────────
    CreateImage {
        device: Handle,
        create_info: ImageCreateInfo,
    },
    DestroyImage {
        device: Handle,
        image: Handle,
    },
    BindImageMemory {
        device: Handle,
        image: Handle,
        memory: Handle,
        memory_offset: u64,
    },
    CreateImageView {
        device: Handle,
        create_info: ImageViewCreateInfo,
    },
    DestroyImageView {
        device: Handle,
        image_view: Handle,
    },
    CreateSampler {
        device: Handle,
        create_info: SamplerCreateInfo,
    },
    DestroySampler {
        device: Handle,
        sampler: Handle,
    },

    // ── Shader Module ───────────────────────────────────────
    CreateShaderModule {
        device: Handle,
        code: Vec<u8>,
    },
    DestroyShaderModule {
        device: Handle,
        shader_module: Handle,
    },

    // ── Layouts ─────────────────────────────────────────────
    CreateDescriptorSetLayout {
        device: Handle,
        flags: u32,
        bindings: Vec<DescriptorSetLayoutBinding>,
    },
    DestroyDescriptorSetLayout {
        device: Handle,
        layout: Handle,
    },
    CreatePipelineLayout {
        device: Handle,
        set_layouts: Vec<Handle>,
        #[serde(default)]
        push_constant_ranges: Vec<PushConstantRange>,
    },
    DestroyPipelineLayout {
        device: Handle,
        layout: Handle,
    },

    // ── Pipelines ───────────────────────────────────────────
    CreateGraphicsPipelines {
        device: Handle,
        create_infos: Vec<GraphicsPipelineCreateInfo>,
    },
    CreateComputePipelines {
        device: Handle,
        create_infos: Vec<ComputePipelineCreateInfo>,
    },
    DestroyPipeline {
        device: Handle,
        pipeline: Handle,
    },

    // ── Descriptor Pool / Set ───────────────────────────────
    CreateDescriptorPool {
        device: Handle,
        flags: u32,
        max_sets: u32,
        pool_sizes: Vec<DescriptorPoolSize>,
    },
    DestroyDescriptorPool {
        device: Handle,
        pool: Handle,
    },
    ResetDescriptorPool {
        device: Handle,
        pool: Handle,
    },
    AllocateDescriptorSets {
        device: Handle,
        descriptor_pool: Handle,
        set_layouts: Vec<Handle>,
    },
    FreeDescriptorSets {
        device: Handle,
        descriptor_pool: Handle,
        descriptor_sets: Vec<Handle>,
    },
    UpdateDescriptorSets {
        device: Handle,
        writes: Vec<WriteDescriptorSet>,
    },

    // ── Render Pass / Framebuffer ───────────────────────────
    CreateRenderPass {
        device: Handle,
        create_info: RenderPassCreateInfo,
    },
    DestroyRenderPass {
        device: Handle,
        render_pass: Handle,
    },
    CreateFramebuffer {
        device: Handle,
        create_info: FramebufferCreateInfo,
    },
    DestroyFramebuffer {
        device: Handle,
        framebuffer: Handle,
    },

    // ── Command Pool ────────────────────────────────────────
    CreateCommandPool {
        device: Handle,
        flags: u32,
        queue_family_index: u32,
    },
    DestroyCommandPool {
        device: Handle,
        command_pool: Handle,
    },
    ResetCommandPool {
        device: Handle,
        command_pool: Handle,
        flags: u32,
    },

    // ── Command Buffer ──────────────────────────────────────
    AllocateCommandBuffers {
        device: Handle,
        command_pool: Handle,
        level: i32,
        count: u32,
    },
    FreeCommandBuffers {
        device: Handle,
        command_pool: Handle,
        command_buffers: Vec<Handle>,
    },
    BeginCommandBuffer {
        command_buffer: Handle,
        flags: u32,
        inheritance: Option<CommandBufferInheritanceInfo>,
    },
    EndCommandBuffer {
        command_buffer: Handle,
    },
    ResetCommandBuffer {
        command_buffer: Handle,
        flags: u32,
    },

    // ── vkCmd* Recording ────────────────────────────────────
    CmdBindPipeline {
        command_buffer: Handle,
        pipeline_bind_point: i32,
        pipeline: Handle,
    },
    CmdBindDescriptorSets {
        command_buffer: Handle,
        pipeline_bind_point: i32,
        layout: Handle,
        first_set: u32,
        descriptor_sets: Vec<Handle>,
        #[serde(default)]
        dynamic_offsets: Vec<u32>,
    },
    CmdBindVertexBuffers {
        command_buffer: Handle,
        first_binding: u32,
        buffers: Vec<Handle>,
        offsets: Vec<u64>,
    },
    CmdBindIndexBuffer {
        command_buffer: Handle,
        buffer: Handle,
        offset: u64,
        index_type: i32,
    },
    CmdSetViewport {
        command_buffer: Handle,
        first_viewport: u32,
        viewport_count: u32,
        viewports: Vec<Viewport>,
    },
    CmdSetScissor {
        command_buffer: Handle,
        first_scissor: u32,
        scissor_count: u32,
        scissors: Vec<Rect2D>,
    },
    CmdDraw {
        command_buffer: Handle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    CmdDrawIndexed {
        command_buffer: Handle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    CmdDispatch {
        command_buffer: Handle,
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    },
    CmdCopyBuffer {
        command_buffer: Handle,
        src_buffer: Handle,
        dst_buffer: Handle,
        regions: Vec<BufferCopy>,
    },
    CmdFillBuffer {
        command_buffer: Handle,
        dst_buffer: Handle,
        dst_offset: u64,
        size: u64,
        data: u32,
    },
    CmdUpdateBuffer {
        command_buffer: Handle,
        dst_buffer: Handle,
        dst_offset: u64,
        data: Vec<u8>,
    },
    CmdCopyBufferToImage {
        command_buffer: Handle,
        src_buffer: Handle,
        dst_image: Handle,
        dst_image_layout: i32,
        regions: Vec<BufferImageCopy>,
    },
    CmdPipelineBarrier {
        command_buffer: Handle,
        src_stage_mask: u32,
        dst_stage_mask: u32,
        dependency_flags: u32,
        #[serde(default)]
        memory_barriers: Vec<MemoryBarrier>,
        #[serde(default)]
        buffer_memory_barriers: Vec<BufferMemoryBarrier>,
        #[serde(default)]
        image_memory_barriers: Vec<ImageMemoryBarrier>,
    },
    CmdBeginRenderPass {
        command_buffer: Handle,
        render_pass: Handle,
        framebuffer: Handle,
        render_area: Rect2D,
        #[serde(default)]
        clear_values: Vec<ClearValue>,
        contents: i32,
    },
    CmdNextSubpass {
        command_buffer: Handle,
        contents: i32,
    },
    CmdEndRenderPass {
        command_buffer: Handle,
    },
    CmdExecuteCommands {
        command_buffer: Handle,
        command_buffers: Vec<Handle>,
    },

    // ── Fence ───────────────────────────────────────────────
    CreateFence {
        device: Handle,
        flags: u32,
    },
    DestroyFence {
        device: Handle,
        fence: Handle,
    },
    ResetFences {
        device: Handle,
        fences: Vec<Handle>,
    },
    GetFenceStatus {
        device: Handle,
        fence: Handle,
    },
    WaitForFences {
        device: Handle,
        fences: Vec<Handle>,
        wait_all: bool,
        timeout: u64,
    },

    // ── Semaphore ───────────────────────────────────────────
    CreateSemaphore {
        device: Handle,
    },
    DestroySemaphore {
        device: Handle,
        semaphore: Handle,
    },
}

impl VulkanCommand {
    /// The entry point this call goes through.
    pub fn entry_point(&self) -> EntryPoint {
        match self {
            VulkanCommand::CreateInstance { .. } => EntryPoint::CreateInstance,
            VulkanCommand::DestroyInstance { .. } => EntryPoint::DestroyInstance,
            VulkanCommand::EnumeratePhysicalDevices { .. } => EntryPoint::EnumeratePhysicalDevices,
            VulkanCommand::CreateDevice { .. } => EntryPoint::CreateDevice,
            VulkanCommand::DestroyDevice { .. } => EntryPoint::DestroyDevice,
            VulkanCommand::GetDeviceQueue { .. } => EntryPoint::GetDeviceQueue,
            VulkanCommand::DeviceWaitIdle { .. } => EntryPoint::DeviceWaitIdle,
            VulkanCommand::QueueSubmit { .. } => EntryPoint::QueueSubmit,
            VulkanCommand::QueueWaitIdle { .. } => EntryPoint::QueueWaitIdle,
            VulkanCommand::AllocateMemory { .. } => EntryPoint::AllocateMemory,
            VulkanCommand::FreeMemory { .. } => EntryPoint::FreeMemory,
            VulkanCommand::MapMemory { .. } => EntryPoint::MapMemory,
            VulkanCommand::UnmapMemory { .. } => EntryPoint::UnmapMemory,
            VulkanCommand::CreateBuffer { .. } => EntryPoint::CreateBuffer,
            VulkanCommand::DestroyBuffer { .. } => EntryPoint::DestroyBuffer,
            VulkanCommand::BindBufferMemory { .. } => EntryPoint::BindBufferMemory,
            VulkanCommand::CreateImage { .. } => EntryPoint::CreateImage,
            VulkanCommand::DestroyImage { .. } => EntryPoint::DestroyImage,
            VulkanCommand::BindImageMemory { .. } => EntryPoint::BindImageMemory,
            VulkanCommand::CreateImageView { .. } => EntryPoint::CreateImageView,
            VulkanCommand::DestroyImageView { .. } => EntryPoint::DestroyImageView,
            VulkanCommand::CreateSampler { .. } => EntryPoint::CreateSampler,
            VulkanCommand::DestroySampler { .. } => EntryPoint::DestroySampler,
            VulkanCommand::CreateShaderModule { .. } => EntryPoint::CreateShaderModule,
            VulkanCommand::DestroyShaderModule { .. } => EntryPoint::DestroyShaderModule,
            VulkanCommand::CreateDescriptorSetLayout { .. } => EntryPoint::CreateDescriptorSetLayout,
            VulkanCommand::DestroyDescriptorSetLayout { .. } => EntryPoint::DestroyDescriptorSetLayout,
            VulkanCommand::CreatePipelineLayout { .. } => EntryPoint::CreatePipelineLayout,
            VulkanCommand::DestroyPipelineLayout { .. } => EntryPoint::DestroyPipelineLayout,
            VulkanCommand::CreateGraphicsPipelines { .. } => EntryPoint::CreateGraphicsPipelines,
            VulkanCommand::CreateComputePipelines { .. } => EntryPoint::CreateComputePipelines,
            VulkanCommand::DestroyPipeline { .. } => EntryPoint::DestroyPipeline,
            VulkanCommand::CreateDescriptorPool { .. } => EntryPoint::CreateDescriptorPool,
            VulkanCommand::DestroyDescriptorPool { .. } => EntryPoint::DestroyDescriptorPool,
            VulkanCommand::ResetDescriptorPool { .. } => EntryPoint::ResetDescriptorPool,
            VulkanCommand::AllocateDescriptorSets { .. } => EntryPoint::AllocateDescriptorSets,
            VulkanCommand::FreeDescriptorSets { .. } => EntryPoint::FreeDescriptorSets,
            VulkanCommand::UpdateDescriptorSets { .. } => EntryPoint::UpdateDescriptorSets,
            VulkanCommand::CreateRenderPass { .. } => EntryPoint::CreateRenderPass,
            VulkanCommand::DestroyRenderPass { .. } => EntryPoint::DestroyRenderPass,
            VulkanCommand::CreateFramebuffer { .. } => EntryPoint::CreateFramebuffer,
            VulkanCommand::DestroyFramebuffer { .. } => EntryPoint::DestroyFramebuffer,
            VulkanCommand::CreateCommandPool { .. } => EntryPoint::CreateCommandPool,
            VulkanCommand::DestroyCommandPool { .. } => EntryPoint::DestroyCommandPool,
            VulkanCommand::ResetCommandPool { .. } => EntryPoint::ResetCommandPool,
            VulkanCommand::AllocateCommandBuffers { .. } => EntryPoint::AllocateCommandBuffers,
            VulkanCommand::FreeCommandBuffers { .. } => EntryPoint::FreeCommandBuffers,
            VulkanCommand::BeginCommandBuffer { .. } => EntryPoint::BeginCommandBuffer,
            VulkanCommand::EndCommandBuffer { .. } => EntryPoint::EndCommandBuffer,
            VulkanCommand::ResetCommandBuffer { .. } => EntryPoint::ResetCommandBuffer,
            VulkanCommand::CmdBindPipeline { .. } => EntryPoint::CmdBindPipeline,
            VulkanCommand::CmdBindDescriptorSets { .. } => EntryPoint::CmdBindDescriptorSets,
            VulkanCommand::CmdBindVertexBuffers { .. } => EntryPoint::CmdBindVertexBuffers,
            VulkanCommand::CmdBindIndexBuffer { .. } => EntryPoint::CmdBindIndexBuffer,
            VulkanCommand::CmdSetViewport { .. } => EntryPoint::CmdSetViewport,
            VulkanCommand::CmdSetScissor { .. } => EntryPoint::CmdSetScissor,
            VulkanCommand::CmdDraw { .. } => EntryPoint::CmdDraw,
            VulkanCommand::CmdDrawIndexed { .. } => EntryPoint::CmdDrawIndexed,
            VulkanCommand::CmdDispatch { .. } => EntryPoint::CmdDispatch,
            VulkanCommand::CmdCopyBuffer { .. } => EntryPoint::CmdCopyBuffer,
            VulkanCommand::CmdFillBuffer { .. } => EntryPoint::CmdFillBuffer,
            VulkanCommand::CmdUpdateBuffer { .. } => EntryPoint::CmdUpdateBuffer,
            VulkanCommand::CmdCopyBufferToImage { .. } => EntryPoint::CmdCopyBufferToImage,
            VulkanCommand::CmdPipelineBarrier { .. } => EntryPoint::CmdPipelineBarrier,
            VulkanCommand::CmdBeginRenderPass { .. } => EntryPoint::CmdBeginRenderPass,
            VulkanCommand::CmdNextSubpass { .. } => EntryPoint::CmdNextSubpass,
            VulkanCommand::CmdEndRenderPass { .. } => EntryPoint::CmdEndRenderPass,
            VulkanCommand::CmdExecuteCommands { .. } => EntryPoint::CmdExecuteCommands,
            VulkanCommand::CreateFence { .. } => EntryPoint::CreateFence,
            VulkanCommand::DestroyFence { .. } => EntryPoint::DestroyFence,
            VulkanCommand::ResetFences { .. } => EntryPoint::ResetFences,
            VulkanCommand::GetFenceStatus { .. } => EntryPoint::GetFenceStatus,
            VulkanCommand::WaitForFences { .. } => EntryPoint::WaitForFences,
            VulkanCommand::CreateSemaphore { .. } => EntryPoint::CreateSemaphore,
            VulkanCommand::DestroySemaphore { .. } => EntryPoint::DestroySemaphore,
        }
    }

    /// The dispatchable first argument the loader dispatches through.
    /// `None` for global commands.
    pub fn dispatch_handle(&self) -> Option<(ObjectType, Handle)> {
        match self {
            VulkanCommand::CreateInstance { .. } => None,
            VulkanCommand::DestroyInstance { instance }
            | VulkanCommand::EnumeratePhysicalDevices { instance } => {
                Some((ObjectType::Instance, *instance))
            }
            VulkanCommand::CreateDevice { physical_device, .. } => {
                Some((ObjectType::PhysicalDevice, *physical_device))
            }
            VulkanCommand::QueueSubmit { queue, .. } | VulkanCommand::QueueWaitIdle { queue } => {
                Some((ObjectType::Queue, *queue))
            }
            VulkanCommand::BeginCommandBuffer { command_buffer, .. }
            | VulkanCommand::EndCommandBuffer { command_buffer }
            | VulkanCommand::ResetCommandBuffer { command_buffer, .. }
            | VulkanCommand::CmdBindPipeline { command_buffer, .. }
            | VulkanCommand::CmdBindDescriptorSets { command_buffer, .. }
            | VulkanCommand::CmdBindVertexBuffers { command_buffer, .. }
            | VulkanCommand::CmdBindIndexBuffer { command_buffer, .. }
            | VulkanCommand::CmdSetViewport { command_buffer, .. }
            | VulkanCommand::CmdSetScissor { command_buffer, .. }
            | VulkanCommand::CmdDraw { command_buffer, .. }
            | VulkanCommand::CmdDrawIndexed { command_buffer, .. }
            | VulkanCommand::CmdDispatch { command_buffer, .. }
            | VulkanCommand::CmdCopyBuffer { command_buffer, .. }
            | VulkanCommand::CmdFillBuffer { command_buffer, .. }
            | VulkanCommand::CmdUpdateBuffer { command_buffer, .. }
            | VulkanCommand::CmdCopyBufferToImage { command_buffer, .. }
            | VulkanCommand::CmdPipelineBarrier { command_buffer, .. }
            | VulkanCommand::CmdBeginRenderPass { command_buffer, .. }
            | VulkanCommand::CmdNextSubpass { command_buffer, .. }
            | VulkanCommand::CmdEndRenderPass { command_buffer }
            | VulkanCommand::CmdExecuteCommands { command_buffer, .. } => {
                Some((ObjectType::CommandBuffer, *command_buffer))
            }
            VulkanCommand::DestroyDevice { device }
            | VulkanCommand::GetDeviceQueue { device, .. }
            | VulkanCommand::DeviceWaitIdle { device }
            | VulkanCommand::AllocateMemory { device, .. }
            | VulkanCommand::FreeMemory { device, .. }
            | VulkanCommand::MapMemory { device, .. }
            | VulkanCommand::UnmapMemory { device, .. }
            | VulkanCommand::CreateBuffer { device, .. }
            | VulkanCommand::DestroyBuffer { device, .. }
            | VulkanCommand::BindBufferMemory { device, .. }
            | VulkanCommand::CreateImage { device, .. }
            | VulkanCommand::DestroyImage { device, .. }
            | VulkanCommand::BindImageMemory { device, .. }
            | VulkanCommand::CreateImageView { device, .. }
            | VulkanCommand::DestroyImageView { device, .. }
            | VulkanCommand::CreateSampler { device, .. }
            | VulkanCommand::DestroySampler { device, .. }
            | VulkanCommand::CreateShaderModule { device, .. }
            | VulkanCommand::DestroyShaderModule { device, .. }
            | VulkanCommand::CreateDescriptorSetLayout { device, .. }
            | VulkanCommand::DestroyDescriptorSetLayout { device, .. }
            | VulkanCommand::CreatePipelineLayout { device, .. }
            | VulkanCommand::DestroyPipelineLayout { device, .. }
            | VulkanCommand::CreateGraphicsPipelines { device, .. }
            | VulkanCommand::CreateComputePipelines { device, .. }
            | VulkanCommand::DestroyPipeline { device, .. }
            | VulkanCommand::CreateDescriptorPool { device, .. }
            | VulkanCommand::DestroyDescriptorPool { device, .. }
            | VulkanCommand::ResetDescriptorPool { device, .. }
            | VulkanCommand::AllocateDescriptorSets { device, .. }
            | VulkanCommand::FreeDescriptorSets { device, .. }
            | VulkanCommand::UpdateDescriptorSets { device, .. }
            | VulkanCommand::CreateRenderPass { device, .. }
            | VulkanCommand::DestroyRenderPass { device, .. }
            | VulkanCommand::CreateFramebuffer { device, .. }
            | VulkanCommand::DestroyFramebuffer { device, .. }
            | VulkanCommand::CreateCommandPool { device, .. }
            | VulkanCommand::DestroyCommandPool { device, .. }
            | VulkanCommand::ResetCommandPool { device, .. }
            | VulkanCommand::AllocateCommandBuffers { device, .. }
            | VulkanCommand::FreeCommandBuffers { device, .. }
            | VulkanCommand::CreateFence { device, .. }
            | VulkanCommand::DestroyFence { device, .. }
            | VulkanCommand::ResetFences { device, .. }
            | VulkanCommand::GetFenceStatus { device, .. }
            | VulkanCommand::WaitForFences { device, .. }
            | VulkanCommand::CreateSemaphore { device }
            | VulkanCommand::DestroySemaphore { device, .. } => {
                Some((ObjectType::Device, *device))
            }
        }
    }

    /// The command buffer a `vkCmd*` / begin / end / reset call targets.
    pub fn command_buffer(&self) -> Option<Handle> {
        match self.dispatch_handle() {
            Some((ObjectType::CommandBuffer, handle)) => Some(handle),
            _ => None,
        }
    }
}

// ============================================================================
// Vulkan Responses (driver → application)
// ============================================================================

/// The result of one API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VulkanResponse {
    Success,
    /// A non-error status other than `VK_SUCCESS` (`VK_NOT_READY`, `VK_TIMEOUT`).
    Status { code: i32 },
    Error { code: i32, message: String },

    // ── Instance / Device ───────────────────────────────────
    InstanceCreated { handle: Handle },
    PhysicalDevices { handles: Vec<Handle> },
    DeviceCreated { handle: Handle },
    QueueRetrieved { handle: Handle },

    // ── Memory ──────────────────────────────────────────────
    MemoryAllocated { handle: Handle },
    MemoryMapped { address: u64 },

    // ── Resources ───────────────────────────────────────────
    BufferCreated { handle: Handle },
    ImageCreated { handle: Handle },
    ImageViewCreated { handle: Handle },
    SamplerCreated { handle: Handle },

    // ── Shader / Pipeline ───────────────────────────────────
    ShaderModuleCreated { handle: Handle },
    DescriptorSetLayoutCreated { handle: Handle },
    PipelineLayoutCreated { handle: Handle },
    PipelinesCreated { handles: Vec<Handle> },

    // ── Descriptors ─────────────────────────────────────────
    DescriptorPoolCreated { handle: Handle },
    DescriptorSetsAllocated { handles: Vec<Handle> },

    // ── Render Pass / Framebuffer ───────────────────────────
    RenderPassCreated { handle: Handle },
    FramebufferCreated { handle: Handle },

    // ── Command Pool / Buffer ───────────────────────────────
    CommandPoolCreated { handle: Handle },
    CommandBuffersAllocated { handles: Vec<Handle> },

    // ── Sync ────────────────────────────────────────────────
    FenceCreated { handle: Handle },
    SemaphoreCreated { handle: Handle },
}

impl VulkanResponse {
    /// Build an error response from a `vk::Result`.
    pub fn error(result: vk::Result) -> Self {
        VulkanResponse::Error {
            code: result.as_raw(),
            message: format!("{:?}", result),
        }
    }

    /// Build the response for a plain `vk::Result` return value.
    pub fn from_result(result: vk::Result) -> Self {
        if result == vk::Result::SUCCESS {
            VulkanResponse::Success
        } else if result.as_raw() > 0 {
            VulkanResponse::Status { code: result.as_raw() }
        } else {
            Self::error(result)
        }
    }

    /// The `VkResult` the application sees for this call.
    pub fn result(&self) -> vk::Result {
        match self {
            VulkanResponse::Status { code } | VulkanResponse::Error { code, .. } => {
                vk::Result::from_raw(*code)
            }
            _ => vk::Result::SUCCESS,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result() == vk::Result::SUCCESS
    }

    pub fn is_error(&self) -> bool {
        matches!(self, VulkanResponse::Error { .. })
    }

    /// The single handle returned by a create call, if any.
    pub fn handle(&self) -> Option<Handle> {
        let mut found = None;
        self.for_each_created(|_, handle| {
            if found.is_none() {
                found = Some(*handle);
            }
        });
        found
    }

    /// All handles returned by the call, in order.
    pub fn handles(&self) -> Vec<Handle> {
        let mut out = Vec::new();
        self.for_each_created(|_, handle| out.push(*handle));
        out
    }
}
