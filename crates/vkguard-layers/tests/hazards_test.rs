//! Integration test: write hazards between pending submissions

mod common;

use ash::vk;
use common::{settings, Harness};
use vkguard_api::vulkan_commands::SubmitInfo;
use vkguard_api::{Handle, VulkanCommand};
use vkguard_core::{ErrorKind, HazardStrictness};

fn with_strictness(strictness: HazardStrictness) -> Harness {
    let mut settings = settings();
    settings.core.hazard_strictness = strictness;
    Harness::with_settings(settings)
}

/// Two command buffers that each fill `buffer`.
fn two_writers(h: &Harness, buffer: Handle) -> (Handle, Handle) {
    (h.recorded_fill(buffer), h.recorded_fill(buffer))
}

#[test]
fn test_unsynchronized_writes_on_two_queues() {
    let h = Harness::new();
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let (first, second) = two_writers(&h, buffer);
    let other_queue = h.queue_at(1);

    assert!(h.submit_one(h.queue, first, Handle::NULL).is_success());
    assert!(h.ids().is_empty());
    let resp = h.submit_one(other_queue, second, Handle::NULL);

    // Hazards are reported; the submission still goes through.
    assert!(resp.is_success());
    assert_eq!(h.ids(), vec!["CoreValidation-Hazard-CrossQueue"]);
    assert_eq!(h.kinds(), vec![ErrorKind::SynchronizationHazard]);
    let diag = h.find("CoreValidation-Hazard-CrossQueue").expect("reported");
    assert!(diag.involves(other_queue));
}

#[test]
fn test_semaphore_chain_orders_the_writes() {
    let h = Harness::new();
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let (first, second) = two_writers(&h, buffer);
    let other_queue = h.queue_at(1);
    let semaphore = h.create_semaphore();

    h.submit(
        h.queue,
        vec![SubmitInfo {
            command_buffers: vec![first],
            signal_semaphores: vec![semaphore],
            ..Default::default()
        }],
        Handle::NULL,
    );
    h.submit(
        other_queue,
        vec![SubmitInfo {
            wait_semaphores: vec![semaphore],
            wait_dst_stage_masks: vec![vk::PipelineStageFlags::TRANSFER.as_raw()],
            command_buffers: vec![second],
            ..Default::default()
        }],
        Handle::NULL,
    );

    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());
}

#[test]
fn test_retired_work_no_longer_conflicts() {
    let h = Harness::new();
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let (first, second) = two_writers(&h, buffer);

    h.submit_one(h.queue, first, Handle::NULL);
    h.call(VulkanCommand::QueueWaitIdle { queue: h.queue });
    h.submit_one(h.queue_at(1), second, Handle::NULL);

    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());
}

#[test]
fn test_hazard_checks_off() {
    let h = with_strictness(HazardStrictness::Off);
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let (first, second) = two_writers(&h, buffer);

    h.submit_one(h.queue, first, Handle::NULL);
    h.submit_one(h.queue_at(1), second, Handle::NULL);
    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());
}

#[test]
fn test_same_queue_only_in_strict_mode() {
    let h = Harness::new();
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let (first, second) = two_writers(&h, buffer);
    h.submit_one(h.queue, first, Handle::NULL);
    h.submit_one(h.queue, second, Handle::NULL);
    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());

    let h = with_strictness(HazardStrictness::Strict);
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let (first, second) = two_writers(&h, buffer);
    h.submit_one(h.queue, first, Handle::NULL);
    h.submit_one(h.queue, second, Handle::NULL);
    assert_eq!(h.ids(), vec!["CoreValidation-Hazard-SameQueue"]);
}

#[test]
fn test_barrier_satisfies_strict_mode() {
    let h = with_strictness(HazardStrictness::Strict);
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let first = h.recorded_fill(buffer);

    let second = h.primary_command_buffer();
    h.begin(second, vk::CommandBufferUsageFlags::empty());
    h.call(VulkanCommand::CmdPipelineBarrier {
        command_buffer: second,
        src_stage_mask: vk::PipelineStageFlags::TRANSFER.as_raw(),
        dst_stage_mask: vk::PipelineStageFlags::TRANSFER.as_raw(),
        dependency_flags: 0,
        memory_barriers: vec![],
        buffer_memory_barriers: vec![],
        image_memory_barriers: vec![],
    });
    h.fill(second, buffer);
    h.end(second);

    h.submit_one(h.queue, first, Handle::NULL);
    h.submit_one(h.queue, second, Handle::NULL);
    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());
}
