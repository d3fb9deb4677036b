//! Stateless structural checks of call arguments.
//!
//! A call with any invalid parameter is reported and not forwarded, so the
//! state-tracking layers below never see it.

use std::collections::HashSet;
use std::sync::Arc;

use ash::vk;
use vkguard_api::vulkan_commands::*;
use vkguard_api::{EntryPoint, VulkanCommand, VulkanResponse};
use vkguard_core::{DebugReport, Diagnostic, ErrorKind};

use crate::dispatch::{validation_failed, CallContext, Intercept};

/// Largest `vkCmdUpdateBuffer` payload.
pub const MAX_UPDATE_BUFFER_SIZE: usize = 65536;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Valid raw values of one API enumeration, as inclusive ranges.
struct EnumSpec {
    name: &'static str,
    ranges: &'static [(i32, i32)],
}

impl EnumSpec {
    fn contains(&self, raw: i32) -> bool {
        self.ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&raw))
    }
}

macro_rules! enum_spec {
    ($const_name:ident, $name:literal, $ty:ident: $($lo:ident ..= $hi:ident),+) => {
        const $const_name: EnumSpec = EnumSpec {
            name: $name,
            ranges: &[$((vk::$ty::$lo.as_raw(), vk::$ty::$hi.as_raw())),+],
        };
    };
}

enum_spec!(DESCRIPTOR_TYPE, "VkDescriptorType", DescriptorType:
    SAMPLER ..= INPUT_ATTACHMENT, INLINE_UNIFORM_BLOCK ..= INLINE_UNIFORM_BLOCK);
enum_spec!(FORMAT, "VkFormat", Format:
    UNDEFINED ..= ASTC_12X12_SRGB_BLOCK,
    G8B8G8R8_422_UNORM ..= G16_B16_R16_3PLANE_444_UNORM);
enum_spec!(IMAGE_LAYOUT, "VkImageLayout", ImageLayout:
    UNDEFINED ..= PREINITIALIZED,
    PRESENT_SRC_KHR ..= PRESENT_SRC_KHR,
    DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL ..= DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
    DEPTH_ATTACHMENT_OPTIMAL ..= STENCIL_READ_ONLY_OPTIMAL,
    READ_ONLY_OPTIMAL ..= ATTACHMENT_OPTIMAL);
enum_spec!(PIPELINE_BIND_POINT, "VkPipelineBindPoint", PipelineBindPoint: GRAPHICS ..= COMPUTE);
enum_spec!(INDEX_TYPE, "VkIndexType", IndexType: UINT16 ..= UINT32);
enum_spec!(COMMAND_BUFFER_LEVEL, "VkCommandBufferLevel", CommandBufferLevel: PRIMARY ..= SECONDARY);
enum_spec!(SHARING_MODE, "VkSharingMode", SharingMode: EXCLUSIVE ..= CONCURRENT);
enum_spec!(IMAGE_TYPE, "VkImageType", ImageType: TYPE_1D ..= TYPE_3D);
enum_spec!(IMAGE_TILING, "VkImageTiling", ImageTiling: OPTIMAL ..= LINEAR);
enum_spec!(IMAGE_VIEW_TYPE, "VkImageViewType", ImageViewType: TYPE_1D ..= CUBE_ARRAY);
enum_spec!(ATTACHMENT_LOAD_OP, "VkAttachmentLoadOp", AttachmentLoadOp: LOAD ..= DONT_CARE);
enum_spec!(ATTACHMENT_STORE_OP, "VkAttachmentStoreOp", AttachmentStoreOp: STORE ..= DONT_CARE, NONE ..= NONE);
enum_spec!(PRIMITIVE_TOPOLOGY, "VkPrimitiveTopology", PrimitiveTopology: POINT_LIST ..= PATCH_LIST);
enum_spec!(POLYGON_MODE, "VkPolygonMode", PolygonMode: FILL ..= POINT);
enum_spec!(FRONT_FACE, "VkFrontFace", FrontFace: COUNTER_CLOCKWISE ..= CLOCKWISE);
enum_spec!(COMPARE_OP, "VkCompareOp", CompareOp: NEVER ..= ALWAYS);
enum_spec!(BLEND_FACTOR, "VkBlendFactor", BlendFactor: ZERO ..= ONE_MINUS_SRC1_ALPHA);
enum_spec!(BLEND_OP, "VkBlendOp", BlendOp: ADD ..= MAX);
enum_spec!(DYNAMIC_STATE, "VkDynamicState", DynamicState: VIEWPORT ..= STENCIL_REFERENCE);
enum_spec!(FILTER, "VkFilter", Filter: NEAREST ..= LINEAR);
enum_spec!(SAMPLER_MIPMAP_MODE, "VkSamplerMipmapMode", SamplerMipmapMode: NEAREST ..= LINEAR);
enum_spec!(SAMPLER_ADDRESS_MODE, "VkSamplerAddressMode", SamplerAddressMode: REPEAT ..= MIRROR_CLAMP_TO_EDGE);
enum_spec!(VERTEX_INPUT_RATE, "VkVertexInputRate", VertexInputRate: VERTEX ..= INSTANCE);
enum_spec!(SUBPASS_CONTENTS, "VkSubpassContents", SubpassContents: INLINE ..= SECONDARY_COMMAND_BUFFERS);

// Known bits of each flag type.
const BUFFER_CREATE_BITS: u32 = 0x1f;
const BUFFER_USAGE_BITS: u32 = 0x0002_01ff;
const IMAGE_CREATE_BITS: u32 = 0xfff;
const IMAGE_USAGE_BITS: u32 = 0xff;
const IMAGE_ASPECT_BITS: u32 = 0xf;
const SAMPLE_COUNT_BITS: u32 = 0x7f;
const SHADER_STAGE_BITS: u32 = 0x3f;
const COMMAND_POOL_CREATE_BITS: u32 = 0x7;
const COMMAND_POOL_RESET_BITS: u32 = 0x1;
const COMMAND_BUFFER_USAGE_BITS: u32 = 0x7;
const COMMAND_BUFFER_RESET_BITS: u32 = 0x1;
const FENCE_CREATE_BITS: u32 = 0x1;
const DESCRIPTOR_POOL_CREATE_BITS: u32 = 0x3;
const DESCRIPTOR_SET_LAYOUT_CREATE_BITS: u32 = 0x3;
const PIPELINE_CREATE_BITS: u32 = 0x1f;
const PIPELINE_STAGE_BITS: u32 = 0x1ffff;
const ACCESS_BITS: u32 = 0x1ffff;
const DEPENDENCY_BITS: u32 = 0x7;
const CULL_MODE_BITS: u32 = 0x3;
const COLOR_COMPONENT_BITS: u32 = 0xf;

/// Extension structures each parent accepts in its `pNext` chain.
fn allowed_chain(entry: EntryPoint) -> &'static [vk::StructureType] {
    match entry {
        EntryPoint::CreateInstance => &[
            vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            vk::StructureType::DEBUG_REPORT_CALLBACK_CREATE_INFO_EXT,
            vk::StructureType::VALIDATION_FEATURES_EXT,
            vk::StructureType::VALIDATION_FLAGS_EXT,
        ],
        EntryPoint::CreateDevice => &[
            vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
            vk::StructureType::DEVICE_GROUP_DEVICE_CREATE_INFO,
            vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_1_FEATURES,
            vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_2_FEATURES,
            vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
        ],
        EntryPoint::AllocateMemory => &[
            vk::StructureType::MEMORY_ALLOCATE_FLAGS_INFO,
            vk::StructureType::MEMORY_DEDICATED_ALLOCATE_INFO,
            vk::StructureType::EXPORT_MEMORY_ALLOCATE_INFO,
        ],
        EntryPoint::CreateBuffer => &[
            vk::StructureType::EXTERNAL_MEMORY_BUFFER_CREATE_INFO,
            vk::StructureType::BUFFER_OPAQUE_CAPTURE_ADDRESS_CREATE_INFO,
        ],
        EntryPoint::CreateImage => &[
            vk::StructureType::EXTERNAL_MEMORY_IMAGE_CREATE_INFO,
            vk::StructureType::IMAGE_FORMAT_LIST_CREATE_INFO,
            vk::StructureType::IMAGE_STENCIL_USAGE_CREATE_INFO,
        ],
        EntryPoint::CreateGraphicsPipelines => &[
            vk::StructureType::PIPELINE_RENDERING_CREATE_INFO,
            vk::StructureType::PIPELINE_CREATION_FEEDBACK_CREATE_INFO,
        ],
        _ => &[],
    }
}

/// Structures that may appear more than once in one chain.
fn is_repeatable(s_type: vk::StructureType) -> bool {
    s_type == vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT
}

/// Collects the findings for one call.
struct Checker {
    entry: EntryPoint,
    issues: Vec<Diagnostic>,
}

impl Checker {
    fn new(entry: EntryPoint) -> Self {
        Self {
            entry,
            issues: Vec::new(),
        }
    }

    fn fail(&mut self, message_id: &'static str, message: String) {
        self.issues.push(Diagnostic::new(
            ErrorKind::InvalidParameter,
            message_id,
            format!("{}: {}", self.entry.name(), message),
        ));
    }

    fn enum_value(&mut self, arg: &str, spec: &EnumSpec, raw: i32) {
        if !spec.contains(raw) {
            self.fail(
                "ParameterValidation-EnumValue",
                format!("{} ({}) is not a valid {} value", arg, raw, spec.name),
            );
        }
    }

    fn flags(&mut self, arg: &str, type_name: &str, raw: u32, known: u32) {
        let unknown = raw & !known;
        if unknown != 0 {
            self.fail(
                "ParameterValidation-UnknownFlags",
                format!("{} (0x{:x}) sets bits 0x{:x} not defined for {}", arg, raw, unknown, type_name),
            );
        }
    }

    fn required_flags(&mut self, arg: &str, type_name: &str, raw: u32, known: u32) {
        if raw == 0 {
            self.fail("ParameterValidation-RequiredFlags", format!("{} must not be 0", arg));
        } else {
            self.flags(arg, type_name, raw, known);
        }
    }

    fn shader_stages(&mut self, arg: &str, raw: u32) {
        if raw != vk::ShaderStageFlags::ALL.as_raw() && raw != vk::ShaderStageFlags::ALL_GRAPHICS.as_raw() {
            self.flags(arg, "VkShaderStageFlags", raw, SHADER_STAGE_BITS);
        }
    }

    fn single_sample_count(&mut self, arg: &str, raw: u32) {
        if raw & !SAMPLE_COUNT_BITS != 0 || raw.count_ones() != 1 {
            self.fail(
                "ParameterValidation-SampleCount",
                format!("{} (0x{:x}) must be exactly one VkSampleCountFlagBits value", arg, raw),
            );
        }
    }

    fn nonzero(&mut self, arg: &str, value: u64) {
        if value == 0 {
            self.fail("ParameterValidation-Zero", format!("{} must be greater than 0", arg));
        }
    }

    fn count(&mut self, count_arg: &str, count: u64, array_arg: &str, len: usize) {
        if count != len as u64 {
            self.fail(
                "ParameterValidation-CountMismatch",
                format!("{} ({}) does not match the length of {} ({})", count_arg, count, array_arg, len),
            );
        }
    }

    fn non_empty(&mut self, arg: &str, len: usize) {
        if len == 0 {
            self.fail("ParameterValidation-Zero", format!("{} must not be empty", arg));
        }
    }

    fn chain(&mut self, parent: &str, chain: &[ChainedStruct]) {
        let allowed = allowed_chain(self.entry);
        let mut seen = HashSet::new();
        for link in chain {
            let s_type = vk::StructureType::from_raw(link.s_type);
            if !allowed.contains(&s_type) {
                self.fail(
                    "ParameterValidation-pNext",
                    format!("{}.pNext includes {:?}, which is not allowed there", parent, s_type),
                );
            } else if !seen.insert(link.s_type) && !is_repeatable(s_type) {
                self.fail(
                    "ParameterValidation-pNextDuplicate",
                    format!("{}.pNext includes {:?} more than once", parent, s_type),
                );
            }
        }
    }

    fn multiple_of_four(&mut self, arg: &str, value: u64) {
        if value % 4 != 0 {
            self.fail("ParameterValidation-Alignment", format!("{} ({}) must be a multiple of 4", arg, value));
        }
    }
}

pub struct ParameterValidation {
    report: Arc<DebugReport>,
}

impl ParameterValidation {
    pub fn new(report: Arc<DebugReport>) -> Self {
        Self { report }
    }

    /// All parameter findings for `cmd`, without reporting them.
    pub fn check(cmd: &VulkanCommand) -> Vec<Diagnostic> {
        let mut c = Checker::new(cmd.entry_point());

        cmd.for_each_handle(|arg, handle| {
            if handle.is_null() && !arg.is_optional() {
                c.fail(
                    "ParameterValidation-RequiredHandle",
                    format!("{} must not be VK_NULL_HANDLE", arg.name),
                );
            }
        });

        check_command(&mut c, cmd);
        c.issues
    }
}

fn check_command(c: &mut Checker, cmd: &VulkanCommand) {
    match cmd {
        VulkanCommand::CreateInstance { p_next, .. } => c.chain("pCreateInfo", p_next),
        VulkanCommand::CreateDevice {
            p_next,
            queue_create_infos,
            ..
        } => {
            c.chain("pCreateInfo", p_next);
            c.non_empty("pCreateInfo.pQueueCreateInfos", queue_create_infos.len());
            let mut families = HashSet::new();
            for info in queue_create_infos {
                c.non_empty("pQueueCreateInfos.pQueuePriorities", info.queue_priorities.len());
                if !families.insert(info.queue_family_index) {
                    c.fail(
                        "ParameterValidation-QueueFamily",
                        format!("queue family {} is requested more than once", info.queue_family_index),
                    );
                }
                if info.queue_priorities.iter().any(|p| !(0.0..=1.0).contains(p)) {
                    c.fail(
                        "ParameterValidation-Range",
                        "pQueuePriorities values must be between 0.0 and 1.0".to_string(),
                    );
                }
            }
        }
        VulkanCommand::QueueSubmit { submits, .. } => {
            for submit in submits {
                c.count(
                    "pSubmits.waitSemaphoreCount",
                    submit.wait_semaphores.len() as u64,
                    "pSubmits.pWaitDstStageMask",
                    submit.wait_dst_stage_masks.len(),
                );
                for &mask in &submit.wait_dst_stage_masks {
                    c.required_flags("pSubmits.pWaitDstStageMask", "VkPipelineStageFlags", mask, PIPELINE_STAGE_BITS);
                }
            }
        }

        VulkanCommand::AllocateMemory {
            p_next,
            allocation_size,
            ..
        } => {
            c.chain("pAllocateInfo", p_next);
            c.nonzero("pAllocateInfo.allocationSize", *allocation_size);
        }
        VulkanCommand::MapMemory { size, flags, .. } => {
            c.nonzero("size", *size);
            c.flags("flags", "VkMemoryMapFlags", *flags, 0);
        }

        VulkanCommand::CreateBuffer { create_info, .. } => {
            c.chain("pCreateInfo", &create_info.p_next);
            c.flags("pCreateInfo.flags", "VkBufferCreateFlags", create_info.flags, BUFFER_CREATE_BITS);
            c.nonzero("pCreateInfo.size", create_info.size);
            c.required_flags("pCreateInfo.usage", "VkBufferUsageFlags", create_info.usage, BUFFER_USAGE_BITS);
            check_sharing(c, create_info.sharing_mode, &create_info.queue_family_indices);
        }
        VulkanCommand::CreateImage { create_info, .. } => {
            c.chain("pCreateInfo", &create_info.p_next);
            c.flags("pCreateInfo.flags", "VkImageCreateFlags", create_info.flags, IMAGE_CREATE_BITS);
            c.enum_value("pCreateInfo.imageType", &IMAGE_TYPE, create_info.image_type);
            c.enum_value("pCreateInfo.format", &FORMAT, create_info.format);
            if create_info.format == vk::Format::UNDEFINED.as_raw() {
                c.fail("ParameterValidation-Format", "pCreateInfo.format must not be VK_FORMAT_UNDEFINED".to_string());
            }
            for (i, &extent) in create_info.extent.iter().enumerate() {
                c.nonzero(["pCreateInfo.extent.width", "pCreateInfo.extent.height", "pCreateInfo.extent.depth"][i], extent as u64);
            }
            c.nonzero("pCreateInfo.mipLevels", create_info.mip_levels as u64);
            c.nonzero("pCreateInfo.arrayLayers", create_info.array_layers as u64);
            c.single_sample_count("pCreateInfo.samples", create_info.samples);
            c.enum_value("pCreateInfo.tiling", &IMAGE_TILING, create_info.tiling);
            c.required_flags("pCreateInfo.usage", "VkImageUsageFlags", create_info.usage, IMAGE_USAGE_BITS);
            check_sharing(c, create_info.sharing_mode, &create_info.queue_family_indices);
            let layout = vk::ImageLayout::from_raw(create_info.initial_layout);
            if layout != vk::ImageLayout::UNDEFINED && layout != vk::ImageLayout::PREINITIALIZED {
                c.fail(
                    "ParameterValidation-InitialLayout",
                    format!("pCreateInfo.initialLayout must be UNDEFINED or PREINITIALIZED, not {:?}", layout),
                );
            }
        }
        VulkanCommand::CreateImageView { create_info, .. } => {
            c.enum_value("pCreateInfo.viewType", &IMAGE_VIEW_TYPE, create_info.view_type);
            c.enum_value("pCreateInfo.format", &FORMAT, create_info.format);
            check_subresource_range(c, "pCreateInfo.subresourceRange", &create_info.subresource_range);
        }
        VulkanCommand::CreateSampler { create_info, .. } => {
            c.enum_value("pCreateInfo.magFilter", &FILTER, create_info.mag_filter);
            c.enum_value("pCreateInfo.minFilter", &FILTER, create_info.min_filter);
            c.enum_value("pCreateInfo.mipmapMode", &SAMPLER_MIPMAP_MODE, create_info.mipmap_mode);
            c.enum_value("pCreateInfo.addressModeU", &SAMPLER_ADDRESS_MODE, create_info.address_mode_u);
            c.enum_value("pCreateInfo.addressModeV", &SAMPLER_ADDRESS_MODE, create_info.address_mode_v);
            c.enum_value("pCreateInfo.addressModeW", &SAMPLER_ADDRESS_MODE, create_info.address_mode_w);
            if create_info.compare_enable {
                c.enum_value("pCreateInfo.compareOp", &COMPARE_OP, create_info.compare_op);
            }
            if create_info.anisotropy_enable && create_info.max_anisotropy < 1.0 {
                c.fail(
                    "ParameterValidation-Range",
                    format!("pCreateInfo.maxAnisotropy ({}) must be at least 1.0", create_info.max_anisotropy),
                );
            }
            if create_info.max_lod < create_info.min_lod {
                c.fail(
                    "ParameterValidation-Range",
                    format!("pCreateInfo.maxLod ({}) is less than minLod ({})", create_info.max_lod, create_info.min_lod),
                );
            }
        }

        VulkanCommand::CreateShaderModule { code, .. } => check_shader_code(c, code),

        VulkanCommand::CreateDescriptorSetLayout { flags, bindings, .. } => {
            c.flags("pCreateInfo.flags", "VkDescriptorSetLayoutCreateFlags", *flags, DESCRIPTOR_SET_LAYOUT_CREATE_BITS);
            let mut numbers = HashSet::new();
            for binding in bindings {
                c.enum_value("pBindings.descriptorType", &DESCRIPTOR_TYPE, binding.descriptor_type);
                if binding.descriptor_count > 0 {
                    c.shader_stages("pBindings.stageFlags", binding.stage_flags);
                }
                if !numbers.insert(binding.binding) {
                    c.fail(
                        "ParameterValidation-DuplicateBinding",
                        format!("binding {} is declared more than once", binding.binding),
                    );
                }
                if !binding.immutable_samplers.is_empty() {
                    c.count(
                        "pBindings.descriptorCount",
                        binding.descriptor_count as u64,
                        "pBindings.pImmutableSamplers",
                        binding.immutable_samplers.len(),
                    );
                }
            }
        }
        VulkanCommand::CreatePipelineLayout {
            push_constant_ranges, ..
        } => {
            for range in push_constant_ranges {
                c.required_flags("pPushConstantRanges.stageFlags", "VkShaderStageFlags", range.stage_flags, SHADER_STAGE_BITS);
                c.nonzero("pPushConstantRanges.size", range.size as u64);
                c.multiple_of_four("pPushConstantRanges.offset", range.offset as u64);
                c.multiple_of_four("pPushConstantRanges.size", range.size as u64);
            }
        }
        VulkanCommand::CreateGraphicsPipelines { create_infos, .. } => {
            c.non_empty("pCreateInfos", create_infos.len());
            for info in create_infos {
                check_graphics_pipeline(c, info);
            }
        }
        VulkanCommand::CreateComputePipelines { create_infos, .. } => {
            c.non_empty("pCreateInfos", create_infos.len());
            for info in create_infos {
                c.flags("pCreateInfos.flags", "VkPipelineCreateFlags", info.flags, PIPELINE_CREATE_BITS);
                if info.stage.stage != vk::ShaderStageFlags::COMPUTE.as_raw() {
                    c.fail(
                        "ParameterValidation-ShaderStage",
                        format!("pCreateInfos.stage.stage (0x{:x}) must be VK_SHADER_STAGE_COMPUTE_BIT", info.stage.stage),
                    );
                }
                check_entry_name(c, &info.stage.entry_point);
            }
        }

        VulkanCommand::CreateDescriptorPool {
            flags,
            max_sets,
            pool_sizes,
            ..
        } => {
            c.flags("pCreateInfo.flags", "VkDescriptorPoolCreateFlags", *flags, DESCRIPTOR_POOL_CREATE_BITS);
            c.nonzero("pCreateInfo.maxSets", *max_sets as u64);
            c.non_empty("pCreateInfo.pPoolSizes", pool_sizes.len());
            for size in pool_sizes {
                c.enum_value("pPoolSizes.type", &DESCRIPTOR_TYPE, size.descriptor_type);
                c.nonzero("pPoolSizes.descriptorCount", size.descriptor_count as u64);
            }
        }
        VulkanCommand::AllocateDescriptorSets { set_layouts, .. } => {
            c.non_empty("pAllocateInfo.pSetLayouts", set_layouts.len());
        }
        VulkanCommand::FreeDescriptorSets { descriptor_sets, .. } => {
            c.non_empty("pDescriptorSets", descriptor_sets.len());
        }
        VulkanCommand::UpdateDescriptorSets { writes, .. } => {
            for write in writes {
                check_descriptor_write(c, write);
            }
        }

        VulkanCommand::CreateRenderPass { create_info, .. } => check_render_pass(c, create_info),
        VulkanCommand::CreateFramebuffer { create_info, .. } => {
            c.nonzero("pCreateInfo.width", create_info.width as u64);
            c.nonzero("pCreateInfo.height", create_info.height as u64);
            c.nonzero("pCreateInfo.layers", create_info.layers as u64);
        }

        VulkanCommand::CreateCommandPool { flags, .. } => {
            c.flags("pCreateInfo.flags", "VkCommandPoolCreateFlags", *flags, COMMAND_POOL_CREATE_BITS);
        }
        VulkanCommand::ResetCommandPool { flags, .. } => {
            c.flags("flags", "VkCommandPoolResetFlags", *flags, COMMAND_POOL_RESET_BITS);
        }
        VulkanCommand::AllocateCommandBuffers { level, count, .. } => {
            c.enum_value("pAllocateInfo.level", &COMMAND_BUFFER_LEVEL, *level);
            c.nonzero("pAllocateInfo.commandBufferCount", *count as u64);
        }
        VulkanCommand::FreeCommandBuffers { command_buffers, .. } => {
            c.non_empty("pCommandBuffers", command_buffers.len());
        }
        VulkanCommand::BeginCommandBuffer { flags, .. } => {
            c.flags("pBeginInfo.flags", "VkCommandBufferUsageFlags", *flags, COMMAND_BUFFER_USAGE_BITS);
        }
        VulkanCommand::ResetCommandBuffer { flags, .. } => {
            c.flags("flags", "VkCommandBufferResetFlags", *flags, COMMAND_BUFFER_RESET_BITS);
        }

        VulkanCommand::CmdBindPipeline {
            pipeline_bind_point, ..
        } => c.enum_value("pipelineBindPoint", &PIPELINE_BIND_POINT, *pipeline_bind_point),
        VulkanCommand::CmdBindDescriptorSets {
            pipeline_bind_point,
            descriptor_sets,
            ..
        } => {
            c.enum_value("pipelineBindPoint", &PIPELINE_BIND_POINT, *pipeline_bind_point);
            c.non_empty("pDescriptorSets", descriptor_sets.len());
        }
        VulkanCommand::CmdBindVertexBuffers { buffers, offsets, .. } => {
            c.non_empty("pBuffers", buffers.len());
            c.count("bindingCount", buffers.len() as u64, "pOffsets", offsets.len());
        }
        VulkanCommand::CmdBindIndexBuffer { index_type, .. } => {
            c.enum_value("indexType", &INDEX_TYPE, *index_type);
        }
        VulkanCommand::CmdSetViewport {
            viewport_count,
            viewports,
            ..
        } => {
            c.nonzero("viewportCount", *viewport_count as u64);
            c.count("viewportCount", *viewport_count as u64, "pViewports", viewports.len());
            for viewport in viewports {
                if viewport.width <= 0.0 {
                    c.fail(
                        "ParameterValidation-Range",
                        format!("pViewports.width ({}) must be greater than 0.0", viewport.width),
                    );
                }
                if !(0.0..=1.0).contains(&viewport.min_depth) || !(0.0..=1.0).contains(&viewport.max_depth) {
                    c.fail(
                        "ParameterValidation-Range",
                        "pViewports depth range must be within [0.0, 1.0]".to_string(),
                    );
                }
            }
        }
        VulkanCommand::CmdSetScissor {
            scissor_count,
            scissors,
            ..
        } => {
            c.nonzero("scissorCount", *scissor_count as u64);
            c.count("scissorCount", *scissor_count as u64, "pScissors", scissors.len());
            for scissor in scissors {
                if scissor.offset[0] < 0 || scissor.offset[1] < 0 {
                    c.fail(
                        "ParameterValidation-Range",
                        format!("pScissors.offset ({:?}) must not be negative", scissor.offset),
                    );
                }
            }
        }
        VulkanCommand::CmdCopyBuffer { regions, .. } => {
            c.non_empty("pRegions", regions.len());
            for region in regions {
                c.nonzero("pRegions.size", region.size);
            }
        }
        VulkanCommand::CmdFillBuffer { dst_offset, size, .. } => {
            c.multiple_of_four("dstOffset", *dst_offset);
            c.nonzero("size", *size);
            if *size != vk::WHOLE_SIZE {
                c.multiple_of_four("size", *size);
            }
        }
        VulkanCommand::CmdUpdateBuffer { dst_offset, data, .. } => {
            c.multiple_of_four("dstOffset", *dst_offset);
            c.non_empty("pData", data.len());
            c.multiple_of_four("dataSize", data.len() as u64);
            if data.len() > MAX_UPDATE_BUFFER_SIZE {
                c.fail(
                    "ParameterValidation-Range",
                    format!("dataSize ({}) must not exceed {}", data.len(), MAX_UPDATE_BUFFER_SIZE),
                );
            }
        }
        VulkanCommand::CmdCopyBufferToImage {
            dst_image_layout,
            regions,
            ..
        } => {
            c.enum_value("dstImageLayout", &IMAGE_LAYOUT, *dst_image_layout);
            c.non_empty("pRegions", regions.len());
            for region in regions {
                c.required_flags(
                    "pRegions.imageSubresource.aspectMask",
                    "VkImageAspectFlags",
                    region.image_subresource.aspect_mask,
                    IMAGE_ASPECT_BITS,
                );
                c.nonzero("pRegions.imageSubresource.layerCount", region.image_subresource.layer_count as u64);
                c.multiple_of_four("pRegions.bufferOffset", region.buffer_offset);
            }
        }
        VulkanCommand::CmdPipelineBarrier {
            src_stage_mask,
            dst_stage_mask,
            dependency_flags,
            memory_barriers,
            buffer_memory_barriers,
            image_memory_barriers,
            ..
        } => {
            c.required_flags("srcStageMask", "VkPipelineStageFlags", *src_stage_mask, PIPELINE_STAGE_BITS);
            c.required_flags("dstStageMask", "VkPipelineStageFlags", *dst_stage_mask, PIPELINE_STAGE_BITS);
            c.flags("dependencyFlags", "VkDependencyFlags", *dependency_flags, DEPENDENCY_BITS);
            for barrier in memory_barriers {
                c.flags("pMemoryBarriers.srcAccessMask", "VkAccessFlags", barrier.src_access_mask, ACCESS_BITS);
                c.flags("pMemoryBarriers.dstAccessMask", "VkAccessFlags", barrier.dst_access_mask, ACCESS_BITS);
            }
            for barrier in buffer_memory_barriers {
                c.flags("pBufferMemoryBarriers.srcAccessMask", "VkAccessFlags", barrier.src_access_mask, ACCESS_BITS);
                c.flags("pBufferMemoryBarriers.dstAccessMask", "VkAccessFlags", barrier.dst_access_mask, ACCESS_BITS);
                c.nonzero("pBufferMemoryBarriers.size", barrier.size);
            }
            for barrier in image_memory_barriers {
                c.flags("pImageMemoryBarriers.srcAccessMask", "VkAccessFlags", barrier.src_access_mask, ACCESS_BITS);
                c.flags("pImageMemoryBarriers.dstAccessMask", "VkAccessFlags", barrier.dst_access_mask, ACCESS_BITS);
                c.enum_value("pImageMemoryBarriers.oldLayout", &IMAGE_LAYOUT, barrier.old_layout);
                c.enum_value("pImageMemoryBarriers.newLayout", &IMAGE_LAYOUT, barrier.new_layout);
                let new_layout = vk::ImageLayout::from_raw(barrier.new_layout);
                if new_layout == vk::ImageLayout::UNDEFINED || new_layout == vk::ImageLayout::PREINITIALIZED {
                    c.fail(
                        "ParameterValidation-ImageLayout",
                        format!("pImageMemoryBarriers.newLayout must not be {:?}", new_layout),
                    );
                }
                check_subresource_range(c, "pImageMemoryBarriers.subresourceRange", &barrier.subresource_range);
            }
        }
        VulkanCommand::CmdBeginRenderPass { contents, .. } | VulkanCommand::CmdNextSubpass { contents, .. } => {
            c.enum_value("contents", &SUBPASS_CONTENTS, *contents);
        }
        VulkanCommand::CmdExecuteCommands { command_buffers, .. } => {
            c.non_empty("pCommandBuffers", command_buffers.len());
        }

        VulkanCommand::CreateFence { flags, .. } => {
            c.flags("pCreateInfo.flags", "VkFenceCreateFlags", *flags, FENCE_CREATE_BITS);
        }
        VulkanCommand::ResetFences { fences, .. } => c.non_empty("pFences", fences.len()),
        VulkanCommand::WaitForFences { fences, .. } => c.non_empty("pFences", fences.len()),

        _ => {}
    }
}

fn check_sharing(c: &mut Checker, sharing_mode: i32, queue_family_indices: &[u32]) {
    c.enum_value("pCreateInfo.sharingMode", &SHARING_MODE, sharing_mode);
    if vk::SharingMode::from_raw(sharing_mode) == vk::SharingMode::CONCURRENT {
        if queue_family_indices.len() < 2 {
            c.fail(
                "ParameterValidation-SharingMode",
                "VK_SHARING_MODE_CONCURRENT requires at least two queue family indices".to_string(),
            );
        }
        let unique: HashSet<_> = queue_family_indices.iter().collect();
        if unique.len() != queue_family_indices.len() {
            c.fail(
                "ParameterValidation-SharingMode",
                "pQueueFamilyIndices must not contain duplicates".to_string(),
            );
        }
    }
}

fn check_subresource_range(c: &mut Checker, arg: &str, range: &ImageSubresourceRange) {
    c.required_flags(&format!("{}.aspectMask", arg), "VkImageAspectFlags", range.aspect_mask, IMAGE_ASPECT_BITS);
    c.nonzero(&format!("{}.levelCount", arg), range.level_count as u64);
    c.nonzero(&format!("{}.layerCount", arg), range.layer_count as u64);
}

fn check_shader_code(c: &mut Checker, code: &[u8]) {
    if code.is_empty() {
        c.fail("ParameterValidation-ShaderCode", "pCreateInfo.codeSize must be greater than 0".to_string());
        return;
    }
    if code.len() % 4 != 0 {
        c.fail(
            "ParameterValidation-ShaderCode",
            format!("pCreateInfo.codeSize ({}) must be a multiple of 4", code.len()),
        );
        return;
    }
    let magic: u32 = bytemuck::pod_read_unaligned(&code[..4]);
    if magic != SPIRV_MAGIC {
        c.fail(
            "ParameterValidation-ShaderCode",
            format!("pCreateInfo.pCode starts with 0x{:08x}, not the SPIR-V magic number", magic),
        );
    }
}

fn check_entry_name(c: &mut Checker, name: &str) {
    if name.is_empty() || name.contains('\0') {
        c.fail(
            "ParameterValidation-EntryPointName",
            format!("pName ({:?}) must be a non-empty entry point name", name),
        );
    }
}

fn check_graphics_pipeline(c: &mut Checker, info: &GraphicsPipelineCreateInfo) {
    c.chain("pCreateInfos", &info.p_next);
    c.flags("pCreateInfos.flags", "VkPipelineCreateFlags", info.flags, PIPELINE_CREATE_BITS);
    c.non_empty("pCreateInfos.pStages", info.stages.len());

    let mut stages = HashSet::new();
    for stage in &info.stages {
        if stage.stage.count_ones() != 1 || stage.stage & !SHADER_STAGE_BITS != 0 {
            c.fail(
                "ParameterValidation-ShaderStage",
                format!("pStages.stage (0x{:x}) must be a single shader stage bit", stage.stage),
            );
        } else if stage.stage == vk::ShaderStageFlags::COMPUTE.as_raw() {
            c.fail(
                "ParameterValidation-ShaderStage",
                "pStages.stage must not be VK_SHADER_STAGE_COMPUTE_BIT in a graphics pipeline".to_string(),
            );
        }
        if !stages.insert(stage.stage) {
            c.fail(
                "ParameterValidation-ShaderStage",
                format!("pStages contains stage 0x{:x} more than once", stage.stage),
            );
        }
        check_entry_name(c, &stage.entry_point);
    }
    if !stages.contains(&vk::ShaderStageFlags::VERTEX.as_raw()) {
        c.fail(
            "ParameterValidation-ShaderStage",
            "pStages must include a vertex shader".to_string(),
        );
    }

    for binding in &info.vertex_input.bindings {
        c.enum_value("pVertexInputState.pVertexBindingDescriptions.inputRate", &VERTEX_INPUT_RATE, binding.input_rate);
    }
    for attribute in &info.vertex_input.attributes {
        c.enum_value("pVertexInputState.pVertexAttributeDescriptions.format", &FORMAT, attribute.format);
        if !info
            .vertex_input
            .bindings
            .iter()
            .any(|b| b.binding == attribute.binding)
        {
            c.fail(
                "ParameterValidation-VertexInput",
                format!(
                    "vertex attribute at location {} uses binding {}, which is not described",
                    attribute.location, attribute.binding
                ),
            );
        }
    }

    c.enum_value("pInputAssemblyState.topology", &PRIMITIVE_TOPOLOGY, info.input_assembly.topology);
    c.enum_value("pRasterizationState.polygonMode", &POLYGON_MODE, info.rasterization.polygon_mode);
    c.enum_value("pRasterizationState.frontFace", &FRONT_FACE, info.rasterization.front_face);
    c.flags("pRasterizationState.cullMode", "VkCullModeFlags", info.rasterization.cull_mode, CULL_MODE_BITS);
    if info.rasterization.line_width <= 0.0 {
        c.fail(
            "ParameterValidation-Range",
            format!("pRasterizationState.lineWidth ({}) must be greater than 0.0", info.rasterization.line_width),
        );
    }
    if let Some(viewport) = &info.viewport_state {
        c.nonzero("pViewportState.viewportCount", viewport.viewport_count as u64);
        c.count(
            "pViewportState.scissorCount",
            viewport.scissor_count as u64,
            "pViewportState.viewports",
            viewport.viewport_count as usize,
        );
    }
    if let Some(multisample) = &info.multisample {
        c.single_sample_count("pMultisampleState.rasterizationSamples", multisample.rasterization_samples);
    }
    if let Some(depth) = &info.depth_stencil {
        c.enum_value("pDepthStencilState.depthCompareOp", &COMPARE_OP, depth.depth_compare_op);
    }
    for blend in &info.color_blend_attachments {
        if blend.blend_enable {
            c.enum_value("pColorBlendState.pAttachments.srcColorBlendFactor", &BLEND_FACTOR, blend.src_color_blend_factor);
            c.enum_value("pColorBlendState.pAttachments.dstColorBlendFactor", &BLEND_FACTOR, blend.dst_color_blend_factor);
            c.enum_value("pColorBlendState.pAttachments.colorBlendOp", &BLEND_OP, blend.color_blend_op);
            c.enum_value("pColorBlendState.pAttachments.srcAlphaBlendFactor", &BLEND_FACTOR, blend.src_alpha_blend_factor);
            c.enum_value("pColorBlendState.pAttachments.dstAlphaBlendFactor", &BLEND_FACTOR, blend.dst_alpha_blend_factor);
            c.enum_value("pColorBlendState.pAttachments.alphaBlendOp", &BLEND_OP, blend.alpha_blend_op);
        }
        c.flags(
            "pColorBlendState.pAttachments.colorWriteMask",
            "VkColorComponentFlags",
            blend.color_write_mask,
            COLOR_COMPONENT_BITS,
        );
    }
    let mut dynamic = HashSet::new();
    for &state in &info.dynamic_states {
        c.enum_value("pDynamicState.pDynamicStates", &DYNAMIC_STATE, state);
        if !dynamic.insert(state) {
            c.fail(
                "ParameterValidation-DynamicState",
                format!("pDynamicState.pDynamicStates lists {:?} more than once", vk::DynamicState::from_raw(state)),
            );
        }
    }
}

fn is_image_descriptor(descriptor_type: vk::DescriptorType) -> bool {
    matches!(
        descriptor_type,
        vk::DescriptorType::SAMPLER
            | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::STORAGE_IMAGE
            | vk::DescriptorType::INPUT_ATTACHMENT
    )
}

fn is_buffer_descriptor(descriptor_type: vk::DescriptorType) -> bool {
    matches!(
        descriptor_type,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}

fn check_descriptor_write(c: &mut Checker, write: &WriteDescriptorSet) {
    c.enum_value("pDescriptorWrites.descriptorType", &DESCRIPTOR_TYPE, write.descriptor_type);
    c.nonzero("pDescriptorWrites.descriptorCount", write.descriptor_count as u64);

    let descriptor_type = vk::DescriptorType::from_raw(write.descriptor_type);
    if is_image_descriptor(descriptor_type) {
        c.count(
            "pDescriptorWrites.descriptorCount",
            write.descriptor_count as u64,
            "pDescriptorWrites.pImageInfo",
            write.image_infos.len(),
        );
        for info in &write.image_infos {
            let needs_sampler = matches!(
                descriptor_type,
                vk::DescriptorType::SAMPLER | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            );
            if needs_sampler && info.sampler.is_null() {
                c.fail(
                    "ParameterValidation-RequiredHandle",
                    format!("pImageInfo.sampler must not be VK_NULL_HANDLE for {:?}", descriptor_type),
                );
            }
            if descriptor_type != vk::DescriptorType::SAMPLER {
                if info.image_view.is_null() {
                    c.fail(
                        "ParameterValidation-RequiredHandle",
                        format!("pImageInfo.imageView must not be VK_NULL_HANDLE for {:?}", descriptor_type),
                    );
                }
                c.enum_value("pImageInfo.imageLayout", &IMAGE_LAYOUT, info.image_layout);
            }
        }
    } else if is_buffer_descriptor(descriptor_type) {
        c.count(
            "pDescriptorWrites.descriptorCount",
            write.descriptor_count as u64,
            "pDescriptorWrites.pBufferInfo",
            write.buffer_infos.len(),
        );
        for info in &write.buffer_infos {
            c.nonzero("pBufferInfo.range", info.range);
        }
    }
}

fn check_render_pass(c: &mut Checker, info: &RenderPassCreateInfo) {
    for attachment in &info.attachments {
        c.enum_value("pAttachments.format", &FORMAT, attachment.format);
        c.single_sample_count("pAttachments.samples", attachment.samples);
        c.enum_value("pAttachments.loadOp", &ATTACHMENT_LOAD_OP, attachment.load_op);
        c.enum_value("pAttachments.storeOp", &ATTACHMENT_STORE_OP, attachment.store_op);
        c.enum_value("pAttachments.stencilLoadOp", &ATTACHMENT_LOAD_OP, attachment.stencil_load_op);
        c.enum_value("pAttachments.stencilStoreOp", &ATTACHMENT_STORE_OP, attachment.stencil_store_op);
        c.enum_value("pAttachments.initialLayout", &IMAGE_LAYOUT, attachment.initial_layout);
        c.enum_value("pAttachments.finalLayout", &IMAGE_LAYOUT, attachment.final_layout);
        let final_layout = vk::ImageLayout::from_raw(attachment.final_layout);
        if final_layout == vk::ImageLayout::UNDEFINED || final_layout == vk::ImageLayout::PREINITIALIZED {
            c.fail(
                "ParameterValidation-ImageLayout",
                format!("pAttachments.finalLayout must not be {:?}", final_layout),
            );
        }
    }

    c.non_empty("pCreateInfo.pSubpasses", info.subpasses.len());
    let attachment_count = info.attachments.len() as u32;
    let check_ref = |c: &mut Checker, arg: &str, reference: &AttachmentReference| {
        if reference.attachment == vk::ATTACHMENT_UNUSED {
            return;
        }
        if reference.attachment >= attachment_count {
            c.fail(
                "ParameterValidation-AttachmentIndex",
                format!("{}.attachment ({}) is out of range ({} attachments)", arg, reference.attachment, attachment_count),
            );
        }
        c.enum_value(&format!("{}.layout", arg), &IMAGE_LAYOUT, reference.layout);
    };
    for subpass in &info.subpasses {
        c.enum_value("pSubpasses.pipelineBindPoint", &PIPELINE_BIND_POINT, subpass.pipeline_bind_point);
        if vk::PipelineBindPoint::from_raw(subpass.pipeline_bind_point) != vk::PipelineBindPoint::GRAPHICS {
            c.fail(
                "ParameterValidation-PipelineBindPoint",
                "pSubpasses.pipelineBindPoint must be VK_PIPELINE_BIND_POINT_GRAPHICS".to_string(),
            );
        }
        for reference in &subpass.input_attachments {
            check_ref(c, "pSubpasses.pInputAttachments", reference);
        }
        for reference in &subpass.color_attachments {
            check_ref(c, "pSubpasses.pColorAttachments", reference);
        }
        if !subpass.resolve_attachments.is_empty() {
            c.count(
                "pSubpasses.colorAttachmentCount",
                subpass.color_attachments.len() as u64,
                "pSubpasses.pResolveAttachments",
                subpass.resolve_attachments.len(),
            );
        }
        for reference in &subpass.resolve_attachments {
            check_ref(c, "pSubpasses.pResolveAttachments", reference);
        }
        if let Some(reference) = &subpass.depth_stencil_attachment {
            check_ref(c, "pSubpasses.pDepthStencilAttachment", reference);
        }
        for &index in &subpass.preserve_attachments {
            if index >= attachment_count {
                c.fail(
                    "ParameterValidation-AttachmentIndex",
                    format!("pSubpasses.pPreserveAttachments ({}) is out of range", index),
                );
            }
        }
    }

    let subpass_count = info.subpasses.len() as u32;
    for dependency in &info.dependencies {
        for (arg, index) in [("srcSubpass", dependency.src_subpass), ("dstSubpass", dependency.dst_subpass)] {
            if index != vk::SUBPASS_EXTERNAL && index >= subpass_count {
                c.fail(
                    "ParameterValidation-SubpassIndex",
                    format!("pDependencies.{} ({}) is out of range ({} subpasses)", arg, index, subpass_count),
                );
            }
        }
        c.flags("pDependencies.srcStageMask", "VkPipelineStageFlags", dependency.src_stage_mask, PIPELINE_STAGE_BITS);
        c.flags("pDependencies.dstStageMask", "VkPipelineStageFlags", dependency.dst_stage_mask, PIPELINE_STAGE_BITS);
        c.flags("pDependencies.srcAccessMask", "VkAccessFlags", dependency.src_access_mask, ACCESS_BITS);
        c.flags("pDependencies.dstAccessMask", "VkAccessFlags", dependency.dst_access_mask, ACCESS_BITS);
        c.flags("pDependencies.dependencyFlags", "VkDependencyFlags", dependency.dependency_flags, DEPENDENCY_BITS);
    }
}

impl Intercept for ParameterValidation {
    const NAME: &'static str = "parameter_validation";

    fn intercept(&self, cmd: VulkanCommand, ctx: &CallContext<'_>) -> VulkanResponse {
        let issues = Self::check(&cmd);
        if issues.is_empty() {
            return ctx.forward(cmd);
        }
        for diag in issues {
            self.report.report(diag);
        }
        validation_failed()
    }
}
