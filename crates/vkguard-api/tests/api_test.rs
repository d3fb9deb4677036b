//! Integration test: entry points, handles and responses

use ash::vk;
use vkguard_api::vulkan_commands::*;
use vkguard_api::{DispatchScope, EntryPoint, Handle, ObjectType};

#[test]
fn test_entry_point_names_round_trip() {
    for &ep in EntryPoint::ALL {
        assert_eq!(EntryPoint::from_name(ep.name()), Some(ep));
        assert!(ep.name().starts_with("vk"));
    }
    assert_eq!(EntryPoint::from_name("vkCreateWidget"), None);
    assert_eq!(EntryPoint::COUNT, EntryPoint::ALL.len());
}

#[test]
fn test_entry_point_indices_are_dense() {
    for (i, &ep) in EntryPoint::ALL.iter().enumerate() {
        assert_eq!(ep.index(), i);
    }
}

#[test]
fn test_entry_point_scopes() {
    assert_eq!(EntryPoint::CreateInstance.scope(), DispatchScope::Global);
    assert_eq!(EntryPoint::CreateDevice.scope(), DispatchScope::Instance);
    assert_eq!(EntryPoint::QueueSubmit.scope(), DispatchScope::Device);

    let global: Vec<_> = EntryPoint::in_scope(DispatchScope::Global).collect();
    assert_eq!(global, vec![EntryPoint::CreateInstance]);
    assert!(EntryPoint::in_scope(DispatchScope::Device).all(|ep| ep.scope() == DispatchScope::Device));
}

#[test]
fn test_recording_entry_points() {
    assert!(EntryPoint::CmdDraw.is_recording());
    assert!(EntryPoint::CmdExecuteCommands.is_recording());
    assert!(!EntryPoint::BeginCommandBuffer.is_recording());
    assert!(!EntryPoint::CreateCommandPool.is_recording());
}

#[test]
fn test_dispatchable_object_types() {
    assert!(ObjectType::Instance.is_dispatchable());
    assert!(ObjectType::Queue.is_dispatchable());
    assert!(ObjectType::CommandBuffer.is_dispatchable());
    assert!(!ObjectType::Buffer.is_dispatchable());
    assert!(!ObjectType::DescriptorSet.is_dispatchable());
    assert_eq!(ObjectType::Buffer.to_vk(), vk::ObjectType::BUFFER);
    assert_eq!(ObjectType::Buffer.type_name(), "VkBuffer");
}

#[test]
fn test_handle_display_and_null() {
    assert!(Handle::NULL.is_null());
    assert!(!Handle(0x2a).is_null());
    assert_eq!(format!("{}", Handle(0x2a)), "0x2a");

    let raw: vk::Buffer = Handle(0x1234).to_vk();
    assert_eq!(Handle::from_vk(raw), Handle(0x1234));
}

#[test]
fn test_response_results() {
    assert_eq!(VulkanResponse::Success.result(), vk::Result::SUCCESS);
    assert!(VulkanResponse::Success.is_success());

    let err = VulkanResponse::error(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    assert!(err.is_error());
    assert_eq!(err.result(), vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

    let timeout = VulkanResponse::from_result(vk::Result::TIMEOUT);
    assert_eq!(timeout, VulkanResponse::Status { code: vk::Result::TIMEOUT.as_raw() });
    assert!(!timeout.is_error());
    assert!(!timeout.is_success());

    let created = VulkanResponse::BufferCreated { handle: Handle(9) };
    assert_eq!(created.result(), vk::Result::SUCCESS);
    assert_eq!(created.handle(), Some(Handle(9)));
}

#[test]
fn test_command_serializes_as_json() {
    let cmd = VulkanCommand::CreateBuffer {
        device: Handle(1),
        create_info: BufferCreateInfo {
            size: 256,
            usage: vk::BufferUsageFlags::TRANSFER_DST.as_raw(),
            sharing_mode: vk::SharingMode::EXCLUSIVE.as_raw(),
            ..Default::default()
        },
    };
    let json = serde_json::to_string(&cmd).expect("serialize");
    let back: VulkanCommand = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, cmd);
}
