//! Integration test: stateless parameter checks

mod common;

use ash::vk;
use common::{fake_spirv, graphics_pipeline, stage, Harness};
use vkguard_api::vulkan_commands::*;
use vkguard_api::{EntryPoint, Handle, VulkanCommand};
use vkguard_core::ErrorKind;
use vkguard_layers::ParameterValidation;

fn ids(cmd: &VulkanCommand) -> Vec<&'static str> {
    ParameterValidation::check(cmd).into_iter().map(|d| d.message_id).collect()
}

fn buffer_info(size: u64, usage: u32) -> BufferCreateInfo {
    BufferCreateInfo {
        size,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE.as_raw(),
        ..Default::default()
    }
}

#[test]
fn test_valid_buffer_passes() {
    let cmd = VulkanCommand::CreateBuffer {
        device: Handle(1),
        create_info: buffer_info(64, vk::BufferUsageFlags::VERTEX_BUFFER.as_raw()),
    };
    assert!(ids(&cmd).is_empty());
}

#[test]
fn test_buffer_findings_are_collected_together() {
    let cmd = VulkanCommand::CreateBuffer {
        device: Handle(1),
        create_info: BufferCreateInfo {
            sharing_mode: 7,
            ..buffer_info(0, 0)
        },
    };
    let found = ids(&cmd);
    assert!(found.contains(&"ParameterValidation-Zero"));
    assert!(found.contains(&"ParameterValidation-RequiredFlags"));
    assert!(found.contains(&"ParameterValidation-EnumValue"));
    assert!(ParameterValidation::check(&cmd)
        .iter()
        .all(|d| d.kind == ErrorKind::InvalidParameter && d.message.starts_with("vkCreateBuffer: ")));
}

#[test]
fn test_unknown_usage_bits() {
    let cmd = VulkanCommand::CreateBuffer {
        device: Handle(1),
        create_info: buffer_info(64, 0x8000_0000),
    };
    assert_eq!(ids(&cmd), vec!["ParameterValidation-UnknownFlags"]);
}

#[test]
fn test_concurrent_sharing_needs_two_families() {
    let cmd = VulkanCommand::CreateBuffer {
        device: Handle(1),
        create_info: BufferCreateInfo {
            sharing_mode: vk::SharingMode::CONCURRENT.as_raw(),
            queue_family_indices: vec![0],
            ..buffer_info(64, vk::BufferUsageFlags::UNIFORM_BUFFER.as_raw())
        },
    };
    assert_eq!(ids(&cmd), vec!["ParameterValidation-SharingMode"]);
}

#[test]
fn test_required_handle() {
    let cmd = VulkanCommand::DestroyBuffer {
        device: Handle::NULL,
        buffer: Handle(5),
    };
    assert_eq!(ids(&cmd), vec!["ParameterValidation-RequiredHandle"]);

    // Destroying VK_NULL_HANDLE is allowed.
    let cmd = VulkanCommand::DestroyBuffer {
        device: Handle(1),
        buffer: Handle::NULL,
    };
    assert!(ids(&cmd).is_empty());
}

#[test]
fn test_fill_alignment() {
    let cmd = VulkanCommand::CmdFillBuffer {
        command_buffer: Handle(1),
        dst_buffer: Handle(2),
        dst_offset: 2,
        size: 6,
        data: 0,
    };
    assert_eq!(
        ids(&cmd),
        vec!["ParameterValidation-Alignment", "ParameterValidation-Alignment"]
    );

    let whole = VulkanCommand::CmdFillBuffer {
        command_buffer: Handle(1),
        dst_buffer: Handle(2),
        dst_offset: 0,
        size: vk::WHOLE_SIZE,
        data: 0,
    };
    assert!(ids(&whole).is_empty());
}

#[test]
fn test_shader_code_structure() {
    let module = |code: Vec<u8>| VulkanCommand::CreateShaderModule {
        device: Handle(1),
        code,
    };
    assert_eq!(ids(&module(vec![])), vec!["ParameterValidation-ShaderCode"]);
    assert_eq!(ids(&module(vec![0; 6])), vec!["ParameterValidation-ShaderCode"]);
    assert_eq!(ids(&module(vec![0; 8])), vec!["ParameterValidation-ShaderCode"]);
    assert!(ids(&module(fake_spirv(1))).is_empty());
}

#[test]
fn test_pipeline_stage_rules() {
    let no_vertex = VulkanCommand::CreateGraphicsPipelines {
        device: Handle(1),
        create_infos: vec![graphics_pipeline(
            vec![stage(vk::ShaderStageFlags::FRAGMENT, Handle(3))],
            Handle(4),
            Handle(5),
        )],
    };
    assert_eq!(ids(&no_vertex), vec!["ParameterValidation-ShaderStage"]);

    let doubled = VulkanCommand::CreateGraphicsPipelines {
        device: Handle(1),
        create_infos: vec![graphics_pipeline(
            vec![
                stage(vk::ShaderStageFlags::VERTEX, Handle(2)),
                stage(vk::ShaderStageFlags::VERTEX, Handle(3)),
            ],
            Handle(4),
            Handle(5),
        )],
    };
    assert_eq!(ids(&doubled), vec!["ParameterValidation-ShaderStage"]);
}

#[test]
fn test_set_layout_stage_flags() {
    let layout = |stage_flags: u32| VulkanCommand::CreateDescriptorSetLayout {
        device: Handle(1),
        flags: 0,
        bindings: vec![DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER.as_raw(),
            descriptor_count: 1,
            stage_flags,
            immutable_samplers: vec![],
        }],
    };
    assert!(ids(&layout(vk::ShaderStageFlags::ALL.as_raw())).is_empty());
    assert!(ids(&layout(vk::ShaderStageFlags::ALL_GRAPHICS.as_raw())).is_empty());
    assert!(ids(&layout(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw())).is_empty());
    assert_eq!(ids(&layout(0x100)), vec!["ParameterValidation-UnknownFlags"]);
}

#[test]
fn test_submit_stage_mask_count() {
    let cmd = VulkanCommand::QueueSubmit {
        queue: Handle(1),
        submits: vec![SubmitInfo {
            wait_semaphores: vec![Handle(2)],
            ..Default::default()
        }],
        fence: Handle::NULL,
    };
    assert_eq!(ids(&cmd), vec!["ParameterValidation-CountMismatch"]);
}

#[test]
fn test_invalid_call_never_reaches_lower_layers() {
    let h = Harness::new();
    let resp = h.call(VulkanCommand::CreateBuffer {
        device: h.device,
        create_info: buffer_info(0, vk::BufferUsageFlags::TRANSFER_DST.as_raw()),
    });

    assert_eq!(resp.result(), vk::Result::ERROR_VALIDATION_FAILED_EXT);
    assert_eq!(h.ids(), vec!["ParameterValidation-Zero"]);
    assert_eq!(h.driver.call_count(EntryPoint::CreateBuffer), 0);
    assert_eq!(h.chain.unique_objects().map(|u| u.live_handles()), Some(0));
}

#[test]
fn test_invalid_recording_is_not_recorded() {
    let h = Harness::new();
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::empty());

    let resp = h.call(VulkanCommand::CmdFillBuffer {
        command_buffer: cb,
        dst_buffer: buffer,
        dst_offset: 1,
        size: vk::WHOLE_SIZE,
        data: 0,
    });
    assert!(resp.is_error());
    assert_eq!(h.driver.call_count(EntryPoint::CmdFillBuffer), 0);
    assert_eq!(
        h.chain.object_tracker().and_then(|t| t.status(buffer)),
        Some(vkguard_layers::ObjectStatus::Created)
    );
}
