//! Detects concurrent use of externally synchronized objects.
//!
//! Every handle argument is bracketed by a read or write marker for the
//! duration of the call. A marker that collides with one held by another
//! thread is reported; the call always proceeds.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::Mutex;
use vkguard_api::{EntryPoint, Handle, ObjectType, VulkanCommand, VulkanResponse};
use vkguard_core::{DebugReport, Diagnostic, ErrorKind};

use crate::dispatch::{CallContext, Intercept};

/// Use counts of one object, per thread.
#[derive(Debug, Default)]
struct ObjectUse {
    writers: HashMap<ThreadId, u32>,
    readers: HashMap<ThreadId, u32>,
}

impl ObjectUse {
    fn is_idle(&self) -> bool {
        self.writers.is_empty() && self.readers.is_empty()
    }

    fn other_writer(&self, me: ThreadId) -> Option<ThreadId> {
        self.writers.keys().copied().find(|t| *t != me)
    }

    fn other_reader(&self, me: ThreadId) -> Option<ThreadId> {
        self.readers.keys().copied().find(|t| *t != me)
    }
}

fn enter(counts: &mut HashMap<ThreadId, u32>, me: ThreadId) {
    *counts.entry(me).or_insert(0) += 1;
}

fn leave(counts: &mut HashMap<ThreadId, u32>, me: ThreadId) {
    if let Some(count) = counts.get_mut(&me) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            counts.remove(&me);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ObjectKey {
    object_type: ObjectType,
    handle: Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// Counted use markers for every object currently inside a call.
#[derive(Default)]
pub struct UseCounters {
    uses: Mutex<HashMap<ObjectKey, ObjectUse>>,
}

/// A marker collision: who else holds the object, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision {
    pub other: ThreadId,
    pub other_writes: bool,
}

impl UseCounters {
    pub fn start_write(&self, object_type: ObjectType, handle: Handle, me: ThreadId) -> Option<Collision> {
        let mut uses = self.uses.lock();
        let entry = uses.entry(ObjectKey { object_type, handle }).or_default();
        let collision = match entry.other_writer(me) {
            Some(other) => Some(Collision {
                other,
                other_writes: true,
            }),
            None => entry.other_reader(me).map(|other| Collision {
                other,
                other_writes: false,
            }),
        };
        enter(&mut entry.writers, me);
        collision
    }

    pub fn finish_write(&self, object_type: ObjectType, handle: Handle, me: ThreadId) {
        self.finish(ObjectKey { object_type, handle }, Access::Write, me);
    }

    pub fn start_read(&self, object_type: ObjectType, handle: Handle, me: ThreadId) -> Option<Collision> {
        let mut uses = self.uses.lock();
        let entry = uses.entry(ObjectKey { object_type, handle }).or_default();
        let collision = entry.other_writer(me).map(|other| Collision {
            other,
            other_writes: true,
        });
        enter(&mut entry.readers, me);
        collision
    }

    pub fn finish_read(&self, object_type: ObjectType, handle: Handle, me: ThreadId) {
        self.finish(ObjectKey { object_type, handle }, Access::Read, me);
    }

    fn finish(&self, key: ObjectKey, access: Access, me: ThreadId) {
        let mut uses = self.uses.lock();
        if let Some(entry) = uses.get_mut(&key) {
            match access {
                Access::Read => leave(&mut entry.readers, me),
                Access::Write => leave(&mut entry.writers, me),
            }
            if entry.is_idle() {
                uses.remove(&key);
            }
        }
    }

    /// Objects currently marked by some thread.
    pub fn active(&self) -> usize {
        self.uses.lock().len()
    }
}

pub struct ThreadSafety {
    counters: UseCounters,
    /// Command buffer -> the pool it was allocated from.
    command_pools: DashMap<Handle, Handle>,
    report: Arc<DebugReport>,
}

impl ThreadSafety {
    pub fn new(report: Arc<DebugReport>) -> Self {
        Self {
            counters: UseCounters::default(),
            command_pools: DashMap::new(),
            report,
        }
    }

    pub fn counters(&self) -> &UseCounters {
        &self.counters
    }

    fn report_collision(
        &self,
        entry: EntryPoint,
        object_type: ObjectType,
        handle: Handle,
        access: Access,
        me: ThreadId,
        collision: Collision,
    ) {
        let mine = match access {
            Access::Read => "reading",
            Access::Write => "writing",
        };
        let theirs = if collision.other_writes { "writing" } else { "reading" };
        self.report.report(
            Diagnostic::new(
                ErrorKind::ConcurrentAccess,
                "Threading-MultipleThreads",
                format!(
                    "{}: thread {:?} is {} {} {} while thread {:?} is {} it",
                    entry.name(),
                    me,
                    mine,
                    object_type.type_name(),
                    handle,
                    collision.other,
                    theirs
                ),
            )
            .with_object(object_type, handle),
        );
    }
}

fn touches_pool_contents(entry: EntryPoint) -> bool {
    entry.is_recording()
        || matches!(
            entry,
            EntryPoint::BeginCommandBuffer | EntryPoint::EndCommandBuffer | EntryPoint::ResetCommandBuffer
        )
}

impl Intercept for ThreadSafety {
    const NAME: &'static str = "thread_safety";

    fn intercept(&self, cmd: VulkanCommand, ctx: &CallContext<'_>) -> VulkanResponse {
        let me = thread::current().id();

        let mut markers: Vec<(ObjectType, Handle, Access)> = Vec::new();
        cmd.for_each_handle(|arg, handle| {
            if handle.is_null() {
                return;
            }
            let access = if arg.is_extern_sync() { Access::Write } else { Access::Read };
            markers.push((arg.object_type, *handle, access));
        });
        if touches_pool_contents(ctx.entry) {
            if let Some(pool) = cmd
                .command_buffer()
                .and_then(|cb| self.command_pools.get(&cb).map(|p| *p))
            {
                markers.push((ObjectType::CommandPool, pool, Access::Write));
            }
        }

        for &(object_type, handle, access) in &markers {
            let collision = match access {
                Access::Write => self.counters.start_write(object_type, handle, me),
                Access::Read => self.counters.start_read(object_type, handle, me),
            };
            if let Some(collision) = collision {
                self.report_collision(ctx.entry, object_type, handle, access, me, collision);
            }
        }

        let allocated_from = match &cmd {
            VulkanCommand::AllocateCommandBuffers { command_pool, .. } => Some(*command_pool),
            _ => None,
        };
        let freed: Vec<Handle> = match &cmd {
            VulkanCommand::FreeCommandBuffers { command_buffers, .. } => command_buffers.clone(),
            _ => Vec::new(),
        };
        let destroyed_pool = match &cmd {
            VulkanCommand::DestroyCommandPool { command_pool, .. } => Some(*command_pool),
            _ => None,
        };

        let resp = ctx.forward(cmd);

        for &(object_type, handle, access) in markers.iter().rev() {
            match access {
                Access::Write => self.counters.finish_write(object_type, handle, me),
                Access::Read => self.counters.finish_read(object_type, handle, me),
            }
        }

        if !resp.is_error() {
            if let (Some(pool), VulkanResponse::CommandBuffersAllocated { handles }) = (allocated_from, &resp) {
                for cb in handles {
                    self.command_pools.insert(*cb, pool);
                }
            }
            for cb in freed {
                self.command_pools.remove(&cb);
            }
            if let Some(pool) = destroyed_pool {
                self.command_pools.retain(|_, p| *p != pool);
            }
        }
        resp
    }
}
