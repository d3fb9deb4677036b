//! Integration test: wrapped handle map

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use vkguard_api::{Handle, ObjectType};
use vkguard_core::{HandleAllocator, HandleError, HandleMap};

#[test]
fn test_wrap_unwrap_release() {
    let map = HandleMap::new();
    let wrapped = map.wrap(Handle(0x55), ObjectType::Buffer);

    assert_ne!(wrapped, Handle(0x55));
    assert_eq!(map.unwrap(wrapped), Ok(Handle(0x55)));
    assert_eq!(map.object_type(wrapped), Some(ObjectType::Buffer));
    assert_eq!(map.len(), 1);

    assert_eq!(map.release(wrapped), Ok(Handle(0x55)));
    assert!(map.is_empty());
    assert_eq!(map.unwrap(wrapped), Err(HandleError::DoubleDestroy(wrapped)));
    assert_eq!(map.release(wrapped), Err(HandleError::DoubleDestroy(wrapped)));
}

#[test]
fn test_forgotten_release_becomes_invalid() {
    let map = HandleMap::new();
    let first = map.wrap(Handle(0x10), ObjectType::Buffer);
    let second = map.wrap(Handle(0x11), ObjectType::Buffer);
    map.release(first).expect("release");
    map.release(second).expect("release");
    assert_eq!(map.released_len(), 2);

    map.forget_released([first]);
    assert_eq!(map.released_len(), 1);
    assert_eq!(map.unwrap(first), Err(HandleError::InvalidHandle(first)));
    assert_eq!(map.unwrap(second), Err(HandleError::DoubleDestroy(second)));
}

#[test]
fn test_null_passes_through() {
    let map = HandleMap::new();
    assert_eq!(map.wrap(Handle::NULL, ObjectType::Fence), Handle::NULL);
    assert_eq!(map.unwrap(Handle::NULL), Ok(Handle::NULL));
    assert_eq!(map.release(Handle::NULL), Ok(Handle::NULL));
    assert!(map.is_empty());
}

#[test]
fn test_unknown_handle_is_invalid() {
    let map = HandleMap::new();
    assert_eq!(
        map.unwrap(Handle(0xdead)),
        Err(HandleError::InvalidHandle(Handle(0xdead)))
    );
    assert_eq!(
        map.release(Handle(0xdead)),
        Err(HandleError::InvalidHandle(Handle(0xdead)))
    );
}

#[test]
fn test_same_driver_handle_gets_fresh_wrapper() {
    let map = HandleMap::new();
    let first = map.wrap(Handle(7), ObjectType::Sampler);
    map.release(first).expect("release");
    let second = map.wrap(Handle(7), ObjectType::Sampler);
    assert_ne!(first, second);
}

#[test]
fn test_concurrent_wraps_are_unique() {
    let map = Arc::new(HandleMap::new());
    let threads: Vec<_> = (0..4)
        .map(|t| {
            let map = map.clone();
            thread::spawn(move || {
                (0..250)
                    .map(|i| map.wrap(Handle(t * 1000 + i + 1), ObjectType::Image))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for t in threads {
        for h in t.join().expect("thread panicked") {
            assert!(all.insert(h), "duplicate wrapped handle {}", h);
        }
    }
    assert_eq!(all.len(), 1000);
    assert_eq!(map.len(), 1000);
}

#[test]
fn test_allocator_never_returns_null() {
    let alloc = HandleAllocator::new(0);
    let a = alloc.alloc();
    let b = alloc.alloc();
    assert!(!a.is_null());
    assert_eq!(b.0, a.0 + 1);
}
