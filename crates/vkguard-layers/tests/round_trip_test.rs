//! Integration test: a valid workload reaches the driver unchanged

mod common;

use ash::vk;
use common::{settings, Harness};
use vkguard_api::vulkan_commands::SubmitInfo;
use vkguard_api::{EntryPoint, VulkanCommand};
use vkguard_core::ValidationSettings;

/// Upload-style workload: fill a buffer on the GPU, wait for it, tear down.
fn run_workload(h: &Harness) {
    let buffer = h.create_buffer(1024, vk::BufferUsageFlags::TRANSFER_DST);
    let fence = h.create_fence(false);
    let semaphore = h.create_semaphore();
    let pool = h.create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
    let cb = h.allocate_command_buffer(pool, vk::CommandBufferLevel::PRIMARY);

    h.begin(cb, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    h.fill(cb, buffer);
    h.call(VulkanCommand::CmdUpdateBuffer {
        command_buffer: cb,
        dst_buffer: buffer,
        dst_offset: 16,
        data: vec![0xab; 16],
    });
    h.end(cb);

    h.submit(
        h.queue,
        vec![SubmitInfo {
            command_buffers: vec![cb],
            signal_semaphores: vec![semaphore],
            ..Default::default()
        }],
        fence,
    );
    h.call(VulkanCommand::WaitForFences {
        device: h.device,
        fences: vec![fence],
        wait_all: true,
        timeout: u64::MAX,
    });
    h.call(VulkanCommand::ResetFences {
        device: h.device,
        fences: vec![fence],
    });

    h.call(VulkanCommand::DestroyCommandPool {
        device: h.device,
        command_pool: pool,
    });
    h.call(VulkanCommand::DestroySemaphore {
        device: h.device,
        semaphore,
    });
    h.call(VulkanCommand::DestroyFence {
        device: h.device,
        fence,
    });
    h.destroy_buffer(buffer);
}

fn entry_points(h: &Harness) -> Vec<EntryPoint> {
    h.driver.calls().iter().map(VulkanCommand::entry_point).collect()
}

#[test]
fn test_validated_workload_matches_unvalidated_one() {
    let validated = Harness::new();
    run_workload(&validated);

    let mut bare = settings();
    bare.validation = ValidationSettings::none();
    let unvalidated = Harness::with_settings(bare);
    run_workload(&unvalidated);

    assert!(validated.ids().is_empty(), "unexpected reports: {:?}", validated.ids());
    assert_eq!(entry_points(&validated), entry_points(&unvalidated));
}

#[test]
fn test_teardown_after_workload_reports_only_the_leak() {
    let h = Harness::new();
    run_workload(&h);

    // Only the buffer's memory allocation remains.
    assert_eq!(h.chain.unique_objects().map(|u| u.live_handles()), Some(1));

    h.call(VulkanCommand::DestroyDevice { device: h.device });
    h.call(VulkanCommand::DestroyInstance { instance: h.instance });
    assert_eq!(h.chain.unique_objects().map(|u| u.live_handles()), Some(0));
    assert_eq!(h.count("ObjectTracker-ResourceLeak"), 1);
    assert_eq!(h.driver.call_count(EntryPoint::DestroyInstance), 1);
}
