//! Integration test: command buffer lifecycle, submission and descriptor
//! state tracking

mod common;

use ash::vk;
use common::{entry, handle_of, stage, Harness, StubReflector};
use vkguard_api::vulkan_commands::{ComputePipelineCreateInfo, DescriptorBufferInfo, SubmitInfo, WriteDescriptorSet};
use vkguard_api::{EntryPoint, Handle, VulkanCommand};
use vkguard_core::ErrorKind;
use vkguard_layers::shader_validation::ShaderStage;
use vkguard_layers::{CommandBufferStatus, CoreValidation};

fn core(h: &Harness) -> &CoreValidation {
    match h.chain.core_validation() {
        Some(core) => core,
        None => panic!("core validation is disabled"),
    }
}

fn status(h: &Harness, cb: Handle) -> Option<CommandBufferStatus> {
    core(h).command_buffer_status(h.device, cb)
}

#[test]
fn test_lifecycle_transitions() {
    let h = Harness::new();
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.primary_command_buffer();
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Initial));

    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Recording));
    h.fill(cb, buffer);
    h.end(cb);
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Executable));

    let fence = h.create_fence(false);
    assert!(h.submit_one(h.queue, cb, fence).is_success());
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Pending));
    assert_eq!(core(&h).pending_submissions(h.device), 1);

    let resp = h.call(VulkanCommand::GetFenceStatus {
        device: h.device,
        fence,
    });
    assert!(resp.is_success());
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Executable));
    assert_eq!(core(&h).pending_submissions(h.device), 0);
    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());
}

#[test]
fn test_one_time_submit_becomes_invalid() {
    let h = Harness::new();
    let buffer = h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    h.fill(cb, buffer);
    h.end(cb);

    h.submit_one(h.queue, cb, Handle::NULL);
    h.call(VulkanCommand::QueueWaitIdle { queue: h.queue });
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Invalid));

    h.submit_one(h.queue, cb, Handle::NULL);
    assert_eq!(h.ids(), vec!["CoreValidation-Submit-NotExecutable"]);
}

#[test]
fn test_recording_outside_begin_end() {
    let h = Harness::new();
    let buffer = h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.primary_command_buffer();

    // Still forwarded.
    h.fill(cb, buffer);
    assert_eq!(h.driver.call_count(EntryPoint::CmdFillBuffer), 1);

    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    h.end(cb);
    h.fill(cb, buffer);
    h.end(cb);

    assert_eq!(h.count("CoreValidation-CommandBuffer-NotRecording"), 3);
    assert!(h.kinds().iter().all(|k| *k == ErrorKind::InvalidUsage));
}

#[test]
fn test_begin_and_reset_while_pending() {
    let h = Harness::new();
    let buffer = h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.recorded_fill(buffer);
    h.submit_one(h.queue, cb, Handle::NULL);

    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    assert_eq!(h.ids(), vec!["CoreValidation-CommandBuffer-Pending"]);
    assert_eq!(h.driver.call_count(EntryPoint::BeginCommandBuffer), 2);

    let other = h.recorded_fill(buffer);
    h.submit_one(h.queue, other, Handle::NULL);
    h.clear();
    let resp = h.call(VulkanCommand::ResetCommandBuffer {
        command_buffer: other,
        flags: 0,
    });
    assert!(resp.is_success());
    assert_eq!(h.ids(), vec!["CoreValidation-CommandBuffer-Pending"]);
    assert_eq!(status(&h, other), Some(CommandBufferStatus::Initial));
}

#[test]
fn test_reset_requires_pool_flag() {
    let h = Harness::new();
    let pool = h.create_command_pool(vk::CommandPoolCreateFlags::empty());
    let cb = h.allocate_command_buffer(pool, vk::CommandBufferLevel::PRIMARY);

    h.call(VulkanCommand::ResetCommandBuffer {
        command_buffer: cb,
        flags: 0,
    });
    assert_eq!(h.ids(), vec!["CoreValidation-CommandBuffer-ResetNotAllowed"]);
}

#[test]
fn test_resubmit_without_simultaneous_use() {
    let h = Harness::new();
    let buffer = h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.recorded_fill(buffer);

    h.submit_one(h.queue, cb, Handle::NULL);
    h.submit_one(h.queue, cb, Handle::NULL);
    assert_eq!(h.ids(), vec!["CoreValidation-CommandBuffer-Pending"]);

    let simultaneous = h.primary_command_buffer();
    h.begin(simultaneous, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
    h.fill(simultaneous, buffer);
    h.end(simultaneous);
    h.clear();
    h.submit_one(h.queue, simultaneous, Handle::NULL);
    h.submit_one(h.queue, simultaneous, Handle::NULL);
    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());
}

#[test]
fn test_destroyed_resource_invalidates_recording() {
    let h = Harness::new();
    let buffer = h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.recorded_fill(buffer);
    h.destroy_buffer(buffer);
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Invalid));

    h.submit_one(h.queue, cb, Handle::NULL);
    assert_eq!(h.ids(), vec!["CoreValidation-Submit-NotExecutable"]);
    let diag = h.find("CoreValidation-Submit-NotExecutable").expect("reported");
    assert!(diag.message.contains("invalidated by the destruction or update of"));
}

#[test]
fn test_destroying_resource_of_pending_work() {
    let h = Harness::new();
    let buffer = h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let cb = h.recorded_fill(buffer);
    h.submit_one(h.queue, cb, Handle::NULL);

    h.destroy_buffer(buffer);
    assert_eq!(h.ids(), vec!["CoreValidation-Object-InUse"]);
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Pending));

    h.call(VulkanCommand::DeviceWaitIdle { device: h.device });
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Invalid));
}

#[test]
fn test_fill_needs_usage_and_memory() {
    let h = Harness::new();
    let unbound = h.create_unbound_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let uniform = h.create_buffer(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::empty());

    h.fill(cb, unbound);
    assert_eq!(h.ids(), vec!["CoreValidation-Buffer-NotBound"]);
    h.clear();

    h.call(VulkanCommand::CmdUpdateBuffer {
        command_buffer: cb,
        dst_buffer: uniform,
        dst_offset: 0,
        data: vec![0; 16],
    });
    assert_eq!(h.ids(), vec!["CoreValidation-Buffer-Usage"]);
    h.clear();

    h.call(VulkanCommand::CmdFillBuffer {
        command_buffer: cb,
        dst_buffer: h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST),
        dst_offset: 32,
        size: 64,
        data: 0,
    });
    assert_eq!(h.ids(), vec!["CoreValidation-Buffer-OutOfRange"]);
}

#[test]
fn test_fence_state_at_submit() {
    let h = Harness::new();
    let signaled = h.create_fence(true);
    h.submit(h.queue, vec![], signaled);
    assert_eq!(h.ids(), vec!["CoreValidation-Fence-Signaled"]);
    h.clear();

    let fence = h.create_fence(false);
    h.submit(h.queue, vec![], fence);
    assert!(h.ids().is_empty());
    h.submit(h.queue, vec![], fence);
    assert_eq!(h.ids(), vec!["CoreValidation-Fence-InFlight"]);
    h.clear();

    h.call(VulkanCommand::ResetFences {
        device: h.device,
        fences: vec![fence],
    });
    assert_eq!(h.ids(), vec!["CoreValidation-Fence-InFlight"]);
}

#[test]
fn test_wait_for_fences_retires_work() {
    let h = Harness::new();
    let buffer = h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let first = h.recorded_fill(buffer);
    let second = h.recorded_fill(buffer);
    h.submit_one(h.queue, first, Handle::NULL);
    let fence = h.create_fence(false);
    h.submit_one(h.queue, second, fence);
    assert_eq!(core(&h).pending_submissions(h.device), 2);

    h.call(VulkanCommand::WaitForFences {
        device: h.device,
        fences: vec![fence],
        wait_all: true,
        timeout: u64::MAX,
    });
    // Everything before the fence's submission on that queue is done too.
    assert_eq!(core(&h).pending_submissions(h.device), 0);
    assert_eq!(status(&h, first), Some(CommandBufferStatus::Executable));
    assert_eq!(status(&h, second), Some(CommandBufferStatus::Executable));
}

#[test]
fn test_wait_on_unsignaled_semaphore() {
    let h = Harness::new();
    let semaphore = h.create_semaphore();
    h.submit(
        h.queue,
        vec![SubmitInfo {
            wait_semaphores: vec![semaphore],
            wait_dst_stage_masks: vec![vk::PipelineStageFlags::TRANSFER.as_raw()],
            ..Default::default()
        }],
        Handle::NULL,
    );
    assert_eq!(h.ids(), vec!["CoreValidation-Semaphore-NotSignaled"]);
}

#[test]
fn test_submit_to_wrong_queue_family() {
    let h = Harness::new();
    let buffer = h.create_buffer(64, vk::BufferUsageFlags::TRANSFER_DST);
    let pool = handle_of(h.call(VulkanCommand::CreateCommandPool {
        device: h.device,
        flags: 0,
        queue_family_index: 1,
    }));
    let cb = h.allocate_command_buffer(pool, vk::CommandBufferLevel::PRIMARY);
    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    h.fill(cb, buffer);
    h.end(cb);

    h.submit_one(h.queue, cb, Handle::NULL);
    assert_eq!(h.ids(), vec!["CoreValidation-Submit-QueueFamily"]);
}

#[test]
fn test_descriptor_set_layout_mismatch_names_the_slot() {
    let h = Harness::new();
    let expected = h.create_set_layout(&[
        (0, vk::DescriptorType::UNIFORM_BUFFER),
        (1, vk::DescriptorType::UNIFORM_BUFFER),
        (2, vk::DescriptorType::UNIFORM_BUFFER),
    ]);
    let actual = h.create_set_layout(&[
        (0, vk::DescriptorType::UNIFORM_BUFFER),
        (1, vk::DescriptorType::UNIFORM_BUFFER),
        (2, vk::DescriptorType::STORAGE_BUFFER),
    ]);
    let pipeline_layout = h.create_pipeline_layout(vec![expected]);
    let pool = h.create_descriptor_pool();
    let set = h.allocate_set(pool, actual);

    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    h.call(VulkanCommand::CmdBindDescriptorSets {
        command_buffer: cb,
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS.as_raw(),
        layout: pipeline_layout,
        first_set: 0,
        descriptor_sets: vec![set],
        dynamic_offsets: vec![],
    });

    assert_eq!(h.ids(), vec!["CoreValidation-DescriptorSet-BindingMismatch"]);
    let diag = h.find("CoreValidation-DescriptorSet-BindingMismatch").expect("reported");
    assert_eq!(diag.kind, ErrorKind::BindingMismatch);
    assert!(diag.message.contains("binding slot 2"), "{}", diag.message);
}

#[test]
fn test_identical_layouts_are_compatible() {
    let h = Harness::new();
    let bindings = [(0, vk::DescriptorType::UNIFORM_BUFFER), (1, vk::DescriptorType::STORAGE_BUFFER)];
    let expected = h.create_set_layout(&bindings);
    let twin = h.create_set_layout(&bindings);
    let pipeline_layout = h.create_pipeline_layout(vec![expected]);
    let pool = h.create_descriptor_pool();
    let set = h.allocate_set(pool, twin);

    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    h.call(VulkanCommand::CmdBindDescriptorSets {
        command_buffer: cb,
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS.as_raw(),
        layout: pipeline_layout,
        first_set: 0,
        descriptor_sets: vec![set],
        dynamic_offsets: vec![],
    });
    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());
}

#[test]
fn test_sampled_image_slot_against_storage_buffer_set() {
    let h = Harness::new();
    let expected = h.create_set_layout(&[
        (0, vk::DescriptorType::UNIFORM_BUFFER),
        (1, vk::DescriptorType::UNIFORM_BUFFER),
        (2, vk::DescriptorType::SAMPLED_IMAGE),
    ]);
    let actual = h.create_set_layout(&[
        (0, vk::DescriptorType::UNIFORM_BUFFER),
        (1, vk::DescriptorType::UNIFORM_BUFFER),
        (2, vk::DescriptorType::STORAGE_BUFFER),
    ]);
    let pipeline_layout = h.create_pipeline_layout(vec![expected]);
    let pool = h.create_descriptor_pool();
    let set = h.allocate_set(pool, actual);

    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    h.call(VulkanCommand::CmdBindDescriptorSets {
        command_buffer: cb,
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS.as_raw(),
        layout: pipeline_layout,
        first_set: 0,
        descriptor_sets: vec![set],
        dynamic_offsets: vec![],
    });

    assert_eq!(h.ids(), vec!["CoreValidation-DescriptorSet-BindingMismatch"]);
    let diag = h.find("CoreValidation-DescriptorSet-BindingMismatch").expect("reported");
    assert_eq!(diag.kind, ErrorKind::BindingMismatch);
    assert!(diag.message.contains("binding slot 2"), "{}", diag.message);
    assert!(diag.involves(set));
}

#[test]
fn test_bind_descriptor_sets_at_last_set_index() {
    let h = Harness::new();
    let layout = h.create_set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER)]);
    let pipeline_layout = h.create_pipeline_layout(vec![layout]);
    let pool = h.create_descriptor_pool();
    let sets = vec![h.allocate_set(pool, layout), h.allocate_set(pool, layout)];

    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    let resp = h.call(VulkanCommand::CmdBindDescriptorSets {
        command_buffer: cb,
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS.as_raw(),
        layout: pipeline_layout,
        first_set: u32::MAX,
        descriptor_sets: sets,
        dynamic_offsets: vec![],
    });

    assert!(resp.is_success());
    assert_eq!(h.ids(), vec!["CoreValidation-DescriptorSet-SetIndexOutOfRange"]);
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Recording));
}

#[test]
fn test_bind_vertex_buffers_past_last_binding() {
    let h = Harness::new();
    let buffers = vec![
        h.create_buffer(64, vk::BufferUsageFlags::VERTEX_BUFFER),
        h.create_buffer(64, vk::BufferUsageFlags::VERTEX_BUFFER),
    ];

    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    let resp = h.call(VulkanCommand::CmdBindVertexBuffers {
        command_buffer: cb,
        first_binding: u32::MAX,
        buffers,
        offsets: vec![0, 0],
    });

    assert!(resp.is_success());
    assert_eq!(h.ids(), vec!["CoreValidation-VertexBuffer-BindingRange"]);
    assert_eq!(status(&h, cb), Some(CommandBufferStatus::Recording));
}

#[test]
fn test_descriptor_write_at_last_array_element() {
    let h = Harness::new();
    let layout = h.create_set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER)]);
    let pool = h.create_descriptor_pool();
    let set = h.allocate_set(pool, layout);
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let info = DescriptorBufferInfo {
        buffer,
        offset: 0,
        range: 64,
    };

    let resp = h.call(VulkanCommand::UpdateDescriptorSets {
        device: h.device,
        writes: vec![WriteDescriptorSet {
            dst_set: set,
            dst_binding: 0,
            dst_array_element: u32::MAX,
            descriptor_count: 2,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER.as_raw(),
            image_infos: vec![],
            buffer_infos: vec![info, info],
        }],
    });

    assert!(resp.is_success());
    assert_eq!(h.ids(), vec!["CoreValidation-DescriptorSet-OutOfRange"]);
}

#[test]
fn test_fill_after_memory_is_freed() {
    let h = Harness::new();
    let buffer = h.create_unbound_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let memory = h.allocate_memory(256);
    h.call(VulkanCommand::BindBufferMemory {
        device: h.device,
        buffer,
        memory,
        memory_offset: 0,
    });
    h.call(VulkanCommand::FreeMemory {
        device: h.device,
        memory,
    });
    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());

    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    h.fill(cb, buffer);

    assert_eq!(h.ids(), vec!["CoreValidation-Buffer-MemoryFreed"]);
    let diag = h.find("CoreValidation-Buffer-MemoryFreed").expect("reported");
    assert!(diag.involves(buffer));
}

#[test]
fn test_bound_compute_pipeline_satisfies_dispatch() {
    const COMPUTE: u32 = 3;
    let h = Harness::with_reflector(StubReflector::default().module(COMPUTE, vec![entry(ShaderStage::Compute)]));
    let module = h.create_shader_module(COMPUTE);
    let layout = h.create_pipeline_layout(vec![]);
    let pipeline = handle_of(h.call(VulkanCommand::CreateComputePipelines {
        device: h.device,
        create_infos: vec![ComputePipelineCreateInfo {
            flags: 0,
            stage: stage(vk::ShaderStageFlags::COMPUTE, module),
            layout,
        }],
    }));
    let dispatch = |cb: Handle| {
        h.call(VulkanCommand::CmdDispatch {
            command_buffer: cb,
            group_count_x: 1,
            group_count_y: 1,
            group_count_z: 1,
        })
    };

    let cb = h.primary_command_buffer();
    h.begin(cb, vk::CommandBufferUsageFlags::empty());
    dispatch(cb);
    assert_eq!(h.ids(), vec!["CoreValidation-Dispatch-NoPipeline"]);
    h.clear();

    h.call(VulkanCommand::CmdBindPipeline {
        command_buffer: cb,
        pipeline_bind_point: vk::PipelineBindPoint::COMPUTE.as_raw(),
        pipeline,
    });
    dispatch(cb);
    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());

    // Bound at the wrong point, it still lands in the compute slot.
    let other = h.primary_command_buffer();
    h.begin(other, vk::CommandBufferUsageFlags::empty());
    h.call(VulkanCommand::CmdBindPipeline {
        command_buffer: other,
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS.as_raw(),
        pipeline,
    });
    dispatch(other);
    assert_eq!(h.ids(), vec!["CoreValidation-Pipeline-BindPoint"]);
}
