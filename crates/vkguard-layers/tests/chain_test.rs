//! Integration test: layer chain assembly and dispatch

mod common;

use ash::vk;
use common::{create_device, create_instance, handle_of, settings, Harness};
use vkguard_api::{EntryPoint, Handle, VulkanCommand, VulkanResponse};
use vkguard_core::config::ValidationSettings;
use vkguard_core::handle_map::WRAPPED_HANDLE_BASE;
use vkguard_core::{ErrorKind, LayerError, MessengerCreateInfo};
use vkguard_layers::{LayerChain, NullDriver};

#[test]
fn test_missing_instance_entry_point_fails_build() {
    let driver = NullDriver::without(&[EntryPoint::EnumeratePhysicalDevices]);
    match LayerChain::new(driver) {
        Err(LayerError::MissingEntryPoint { name, .. }) => assert_eq!(name, "vkEnumeratePhysicalDevices"),
        Err(other) => panic!("expected MissingEntryPoint, got {:?}", other),
        Ok(_) => panic!("chain built over a driver without vkEnumeratePhysicalDevices"),
    }
}

#[test]
fn test_missing_device_entry_point_fails_device_creation() {
    let driver = NullDriver::without(&[EntryPoint::CmdDraw]);
    let chain = LayerChain::new(driver.clone()).expect("instance level is complete");

    let instance = handle_of(chain.call(create_instance()));
    let physical_device = match chain.call(VulkanCommand::EnumeratePhysicalDevices { instance }) {
        VulkanResponse::PhysicalDevices { handles } => handles[0],
        other => panic!("expected PhysicalDevices, got {:?}", other),
    };
    let resp = chain.call(create_device(physical_device));

    assert_eq!(resp.result(), vk::Result::ERROR_INITIALIZATION_FAILED);
    assert_eq!(driver.call_count(EntryPoint::CreateDevice), 0);
}

#[test]
fn test_every_layer_enabled_by_default() {
    let h = Harness::new();
    assert!(h.chain.thread_safety().is_some());
    assert!(h.chain.parameter_validation().is_some());
    assert!(h.chain.object_tracker().is_some());
    assert!(h.chain.unique_objects().is_some());
    assert!(h.chain.core_validation().is_some());
}

#[test]
fn test_disabled_layers_drop_out() {
    let mut settings = settings();
    settings.validation = ValidationSettings::none();
    let h = Harness::with_settings(settings);

    assert!(h.chain.thread_safety().is_none());
    assert!(h.chain.core_validation().is_none());

    // Nothing is checked, so even a zero-sized buffer reaches the driver.
    let resp = h.call(VulkanCommand::CreateBuffer {
        device: h.device,
        create_info: Default::default(),
    });
    assert!(resp.handle().is_some());
    assert_eq!(h.driver.call_count(EntryPoint::CreateBuffer), 1);
    assert!(h.ids().is_empty());
}

#[test]
fn test_unknown_dispatchable_handle_is_rejected() {
    let h = Harness::new();
    let resp = h.call(VulkanCommand::QueueWaitIdle { queue: Handle(0xdead) });

    assert_eq!(resp.result(), vk::Result::ERROR_VALIDATION_FAILED_EXT);
    assert_eq!(h.ids(), vec!["Dispatch-UnknownHandle"]);
    assert_eq!(h.driver.call_count(EntryPoint::QueueWaitIdle), 0);
}

#[test]
fn test_queue_and_device_share_dispatch() {
    let h = Harness::new();
    let resp = h.call(VulkanCommand::QueueWaitIdle { queue: h.queue });
    assert!(resp.is_success());
    let resp = h.call(VulkanCommand::DeviceWaitIdle { device: h.device });
    assert!(resp.is_success());
    assert!(h.ids().is_empty());
}

#[test]
fn test_injected_driver_failure_propagates() {
    let h = Harness::new();
    let live_before = h.chain.unique_objects().map(|u| u.live_handles());
    h.driver
        .inject_failure(EntryPoint::AllocateMemory, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

    let resp = h.call(VulkanCommand::AllocateMemory {
        device: h.device,
        p_next: vec![],
        allocation_size: 4096,
        memory_type_index: 0,
    });

    assert_eq!(resp.result(), vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    assert_eq!(h.chain.unique_objects().map(|u| u.live_handles()), live_before);
    assert!(h.ids().is_empty());
}

#[test]
fn test_destroyed_messenger_stops_delivery() {
    let h = Harness::new();
    let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = count.clone();
    let id = h.chain.create_debug_messenger(
        MessengerCreateInfo::new(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .kinds([ErrorKind::InvalidParameter]),
    );

    let zero_sized = || VulkanCommand::CreateBuffer {
        device: h.device,
        create_info: vkguard_api::vulkan_commands::BufferCreateInfo {
            usage: vk::BufferUsageFlags::TRANSFER_DST.as_raw(),
            ..Default::default()
        },
    };
    h.call(zero_sized());
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);

    assert!(h.chain.destroy_debug_messenger(id));
    assert!(!h.chain.destroy_debug_messenger(id));
    h.call(zero_sized());
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(h.chain.report().count(ErrorKind::InvalidParameter), 2);
}

#[test]
fn test_freed_command_buffers_stop_routing() {
    let h = Harness::new();
    let baseline = h.chain.routed_objects();
    let pool = h.create_command_pool(vk::CommandPoolCreateFlags::empty());
    let freed = h.allocate_command_buffer(pool, vk::CommandBufferLevel::PRIMARY);
    let _kept = h.allocate_command_buffer(pool, vk::CommandBufferLevel::PRIMARY);
    assert_eq!(h.chain.routed_objects(), baseline + 2);

    h.call(VulkanCommand::FreeCommandBuffers {
        device: h.device,
        command_pool: pool,
        command_buffers: vec![freed],
    });
    assert_eq!(h.chain.routed_objects(), baseline + 1);
    assert!(h.begin(freed, vk::CommandBufferUsageFlags::empty()).is_error());
    assert_eq!(h.ids(), vec!["Dispatch-UnknownHandle"]);

    h.call(VulkanCommand::DestroyCommandPool {
        device: h.device,
        command_pool: pool,
    });
    assert_eq!(h.chain.routed_objects(), baseline);

    h.call(VulkanCommand::DestroyDevice { device: h.device });
    h.call(VulkanCommand::DestroyInstance { instance: h.instance });
    assert_eq!(h.chain.routed_objects(), 0);
}

#[test]
fn test_parameter_checks_run_before_handle_translation() {
    let h = Harness::new();
    let resp = h.call(VulkanCommand::AllocateCommandBuffers {
        device: h.device,
        command_pool: Handle(WRAPPED_HANDLE_BASE + 0x777),
        level: 99,
        count: 1,
    });

    assert!(resp.is_error());
    assert_eq!(h.ids(), vec!["ParameterValidation-EnumValue"]);
    assert_eq!(h.driver.call_count(EntryPoint::AllocateCommandBuffers), 0);
}
