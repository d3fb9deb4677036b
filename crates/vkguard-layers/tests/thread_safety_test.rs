//! Integration test: concurrent use of externally synchronized objects

mod common;

use std::thread;

use ash::vk;
use common::Harness;
use crossbeam_channel::{bounded, Receiver, Sender};
use vkguard_api::{EntryPoint, Handle, ObjectType, VulkanCommand};
use vkguard_core::ErrorKind;
use vkguard_layers::thread_safety::UseCounters;
use vkguard_layers::ThreadSafety;

/// Park the driver inside `entry` until the test releases it.
fn block_in(h: &Harness, entry: EntryPoint) -> (Receiver<()>, Sender<()>) {
    let (entered_tx, entered_rx) = bounded::<()>(1);
    let (release_tx, release_rx) = bounded::<()>(1);
    h.driver.set_hook(entry, move |_| {
        let _ = entered_tx.send(());
        let _ = release_rx.recv();
    });
    (entered_rx, release_tx)
}

fn thread_safety(h: &Harness) -> &ThreadSafety {
    match h.chain.thread_safety() {
        Some(layer) => layer,
        None => panic!("thread safety layer is disabled"),
    }
}

#[test]
fn test_queue_used_from_two_threads() {
    let h = Harness::new();
    let (entered, release) = block_in(&h, EntryPoint::QueueWaitIdle);

    thread::scope(|s| {
        let waiter = s.spawn(|| h.call(VulkanCommand::QueueWaitIdle { queue: h.queue }));
        entered.recv().expect("driver entered vkQueueWaitIdle");
        assert!(thread_safety(&h).counters().active() > 0);

        let resp = h.submit(h.queue, vec![], Handle::NULL);
        // Reported, not blocked.
        assert!(resp.is_success());
        release.send(()).expect("waiter still parked");
        assert!(waiter.join().expect("waiter thread").is_success());
    });

    assert_eq!(h.count("Threading-MultipleThreads"), 1);
    assert_eq!(h.kinds(), vec![ErrorKind::ConcurrentAccess]);
    let diag = h.find("Threading-MultipleThreads").expect("reported");
    assert!(diag.involves(h.queue));
    assert!(diag.message.contains("vkQueueSubmit"));
    assert_eq!(thread_safety(&h).counters().active(), 0);
}

#[test]
fn test_concurrent_reads_do_not_collide() {
    let h = Harness::new();
    let (entered, release) = block_in(&h, EntryPoint::CreateFence);

    thread::scope(|s| {
        let creator = s.spawn(|| h.create_fence(false));
        entered.recv().expect("driver entered vkCreateFence");

        // Both calls only read the device.
        h.create_semaphore();
        release.send(()).expect("creator still parked");
        creator.join().expect("creator thread");
    });

    assert!(h.ids().is_empty(), "unexpected reports: {:?}", h.ids());
}

#[test]
fn test_recording_from_one_pool_on_two_threads() {
    let h = Harness::new();
    let buffer = h.create_buffer(256, vk::BufferUsageFlags::TRANSFER_DST);
    let pool = h.create_command_pool(vk::CommandPoolCreateFlags::empty());
    let first = h.allocate_command_buffer(pool, vk::CommandBufferLevel::PRIMARY);
    let second = h.allocate_command_buffer(pool, vk::CommandBufferLevel::PRIMARY);
    h.begin(first, vk::CommandBufferUsageFlags::empty());
    h.begin(second, vk::CommandBufferUsageFlags::empty());

    let (entered, release) = block_in(&h, EntryPoint::CmdFillBuffer);
    thread::scope(|s| {
        let recorder = s.spawn(|| h.fill(first, buffer));
        entered.recv().expect("driver entered vkCmdFillBuffer");
        h.driver.clear_hook(EntryPoint::CmdFillBuffer);

        h.fill(second, buffer);
        release.send(()).expect("recorder still parked");
        recorder.join().expect("recorder thread");
    });

    assert_eq!(h.count("Threading-MultipleThreads"), 1);
    let diag = h.find("Threading-MultipleThreads").expect("reported");
    assert!(diag.involves(pool));
}

#[test]
fn test_sequential_use_from_two_threads_is_fine() {
    let h = Harness::new();
    thread::scope(|s| {
        s.spawn(|| h.call(VulkanCommand::QueueWaitIdle { queue: h.queue }))
            .join()
            .expect("first thread");
        s.spawn(|| h.call(VulkanCommand::QueueWaitIdle { queue: h.queue }))
            .join()
            .expect("second thread");
    });
    assert!(h.ids().is_empty());
    assert_eq!(thread_safety(&h).counters().active(), 0);
}

fn other_thread_id() -> thread::ThreadId {
    thread::spawn(|| thread::current().id()).join().expect("id thread")
}

#[test]
fn test_write_collision_survives_writer_handoff() {
    let counters = UseCounters::default();
    let a = thread::current().id();
    let b = other_thread_id();
    let queue = Handle(0x40);

    assert_eq!(counters.start_write(ObjectType::Queue, queue, a), None);
    let collision = counters.start_write(ObjectType::Queue, queue, b).expect("b collides with a");
    assert_eq!(collision.other, a);

    // A leaves while B is still inside; A's next write must see B.
    counters.finish_write(ObjectType::Queue, queue, a);
    let collision = counters.start_write(ObjectType::Queue, queue, a).expect("a collides with b");
    assert_eq!(collision.other, b);
    assert!(collision.other_writes);

    let read = counters.start_read(ObjectType::Queue, queue, b).expect("b reads while a writes");
    assert_eq!(read.other, a);

    counters.finish_read(ObjectType::Queue, queue, b);
    counters.finish_write(ObjectType::Queue, queue, a);
    counters.finish_write(ObjectType::Queue, queue, b);
    assert_eq!(counters.active(), 0);
}
