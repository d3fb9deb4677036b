//! Integration test: object lifetime tracking and leak reports

mod common;

use ash::vk;
use common::Harness;
use vkguard_api::{EntryPoint, Handle, VulkanCommand};
use vkguard_core::ErrorKind;
use vkguard_layers::{ObjectStatus, ObjectTracker};

fn tracker(h: &Harness) -> &ObjectTracker {
    match h.chain.object_tracker() {
        Some(tracker) => tracker,
        None => panic!("object tracker is disabled"),
    }
}

#[test]
fn test_use_after_destroy() {
    let h = Harness::new();
    let buffer = h.create_unbound_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let memory = h.allocate_memory(256);
    assert!(h.destroy_buffer(buffer).is_success());

    let resp = h.call(VulkanCommand::BindBufferMemory {
        device: h.device,
        buffer,
        memory,
        memory_offset: 0,
    });

    assert_eq!(resp.result(), vk::Result::ERROR_VALIDATION_FAILED_EXT);
    assert_eq!(h.ids(), vec!["ObjectTracker-UseAfterFree"]);
    assert_eq!(h.kinds(), vec![ErrorKind::UseAfterFree]);
    assert_eq!(h.driver.call_count(EntryPoint::BindBufferMemory), 0);
}

#[test]
fn test_double_destroy() {
    let h = Harness::new();
    let buffer = h.create_unbound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    assert!(h.destroy_buffer(buffer).is_success());
    assert!(h.destroy_buffer(buffer).is_error());

    assert_eq!(h.ids(), vec!["ObjectTracker-DoubleDestroy"]);
    assert_eq!(h.driver.call_count(EntryPoint::DestroyBuffer), 1);
}

#[test]
fn test_unknown_object() {
    let h = Harness::new();
    let resp = h.destroy_buffer(Handle(0x4242));

    assert!(resp.is_error());
    assert_eq!(h.ids(), vec!["ObjectTracker-UnknownObject"]);
    let diag = h.find("ObjectTracker-UnknownObject").expect("reported");
    assert!(diag.involves(Handle(0x4242)));
}

#[test]
fn test_wrong_object_type() {
    let h = Harness::new();
    let fence = h.create_fence(false);
    let resp = h.destroy_buffer(fence);

    assert!(resp.is_error());
    assert_eq!(h.ids(), vec!["ObjectTracker-WrongType"]);
    assert_eq!(tracker(&h).status(fence), Some(ObjectStatus::Created));
}

#[test]
fn test_status_follows_recording_and_destruction() {
    let h = Harness::new();
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    assert_eq!(tracker(&h).status(buffer), Some(ObjectStatus::Created));

    let cb = h.recorded_fill(buffer);
    assert_eq!(tracker(&h).status(buffer), Some(ObjectStatus::InUse));

    // Re-recording drops the old references.
    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    assert_eq!(tracker(&h).status(buffer), Some(ObjectStatus::Created));

    assert!(h.destroy_buffer(buffer).is_success());
    assert_eq!(tracker(&h).status(buffer), Some(ObjectStatus::Destroyed));
    assert_eq!(tracker(&h).status(Handle(0x4242)), None);
}

#[test]
fn test_freeing_pool_destroys_its_command_buffers() {
    let h = Harness::new();
    let pool = h.create_command_pool(vk::CommandPoolCreateFlags::empty());
    let cb = h.allocate_command_buffer(pool, vk::CommandBufferLevel::PRIMARY);

    h.call(VulkanCommand::DestroyCommandPool {
        device: h.device,
        command_pool: pool,
    });
    assert_eq!(tracker(&h).status(cb), Some(ObjectStatus::Destroyed));

    let resp = h.begin(cb, vk::CommandBufferUsageFlags::empty());
    assert!(resp.is_error());
    assert!(h.ids().contains(&"ObjectTracker-UseAfterFree"));
}

#[test]
fn test_leaks_reported_on_device_destroy() {
    let h = Harness::new();
    let buffers: Vec<Handle> = (0..3)
        .map(|_| h.create_unbound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER))
        .collect();
    let freed = h.create_unbound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    h.destroy_buffer(freed);

    h.call(VulkanCommand::DestroyDevice { device: h.device });

    assert_eq!(h.count("ObjectTracker-ResourceLeak"), 3);
    assert_eq!(h.chain.report().count(ErrorKind::ResourceLeak), 3);
    let leaked = |handle: Handle| {
        h.seen
            .lock()
            .iter()
            .any(|d| d.kind == ErrorKind::ResourceLeak && d.involves(handle))
    };
    for buffer in &buffers {
        assert!(leaked(*buffer));
        assert_eq!(tracker(&h).status(*buffer), None);
    }
    assert!(!leaked(freed));
}

#[test]
fn test_clean_teardown_reports_nothing() {
    let h = Harness::new();
    let buffer = h.create_unbound_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    h.destroy_buffer(buffer);
    h.call(VulkanCommand::DestroyDevice { device: h.device });
    h.call(VulkanCommand::DestroyInstance { instance: h.instance });

    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());
}

#[test]
fn test_device_destroy_clears_tracked_objects() {
    let h = Harness::new();
    let before = tracker(&h).tracked_objects();
    let buffer = h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    h.recorded_fill(buffer);
    let destroyed = h.create_fence(false);
    h.call(VulkanCommand::DestroyFence {
        device: h.device,
        fence: destroyed,
    });
    assert!(tracker(&h).tracked_objects() > before);
    assert!(tracker(&h).recording_command_buffers() > 0);

    h.call(VulkanCommand::DestroyDevice { device: h.device });
    assert_eq!(tracker(&h).recording_command_buffers(), 0);
    assert_eq!(tracker(&h).status(destroyed), None);
    assert_eq!(tracker(&h).status(h.queue), None);
    assert_eq!(tracker(&h).status(h.device), Some(ObjectStatus::Destroyed));

    h.call(VulkanCommand::DestroyInstance { instance: h.instance });
    assert_eq!(tracker(&h).tracked_objects(), 0);
}
