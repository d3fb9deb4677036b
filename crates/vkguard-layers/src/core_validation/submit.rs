//! Queue submissions, fences, semaphores, and cross-submission hazards.

use std::collections::{BTreeMap, HashMap, HashSet};

use ash::vk;
use vkguard_api::vulkan_commands::SubmitInfo;
use vkguard_api::{EntryPoint, Handle, ObjectType, VulkanCommand};
use vkguard_core::{Diagnostic, ErrorKind, HazardStrictness};

use super::command_buffer::{CommandBufferStatus, ResourceAccess};
use super::{usage_error, DeviceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceState {
    pub signaled: bool,
    /// Submission that will signal the fence.
    pub in_flight: Option<u64>,
}

impl FenceState {
    pub fn new(signaled: bool) -> Self {
        Self {
            signaled,
            in_flight: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SemaphoreState {
    pub signaled: bool,
    /// Pending submission that signals the semaphore.
    pub signaler: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueState {
    pub family: u32,
}

/// One batch of a `vkQueueSubmit` that has not been retired yet.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: u64,
    pub queue: Handle,
    /// Primary command buffers and the secondaries they execute.
    pub command_buffers: Vec<Handle>,
    pub fence: Option<Handle>,
    /// Submissions whose semaphore signals this one waits on.
    pub waits: Vec<u64>,
    pub wait_semaphores: Vec<Handle>,
    pub signal_semaphores: Vec<Handle>,
    pub accesses: Vec<ResourceAccess>,
    pub writes: HashSet<Handle>,
}

#[derive(Debug, Default)]
pub struct SubmissionTracker {
    next_id: u64,
    pending: BTreeMap<u64, Submission>,
}

impl SubmissionTracker {
    pub fn pending(&self) -> impl Iterator<Item = &Submission> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Submissions that happen-before a submission waiting on `waits`: the
/// semaphore signalers, everything submitted earlier on their queues, and
/// so on transitively.
fn ancestors(candidates: &[&Submission], waits: &[u64]) -> HashSet<u64> {
    let mut found = HashSet::new();
    let mut stack = waits.to_vec();
    while let Some(id) = stack.pop() {
        if !found.insert(id) {
            continue;
        }
        if let Some(sub) = candidates.iter().find(|s| s.id == id) {
            stack.extend(sub.waits.iter().copied());
            stack.extend(
                candidates
                    .iter()
                    .filter(|s| s.queue == sub.queue && s.id < id)
                    .map(|s| s.id),
            );
        }
    }
    found
}

/// The submissions a `vkQueueSubmit` would create, in batch order.
fn plan(state: &DeviceState, queue: Handle, submits: &[SubmitInfo], fence: Handle) -> Vec<Submission> {
    let mut signalers: HashMap<Handle, Option<u64>> = HashMap::new();
    let mut planned: Vec<Submission> = Vec::with_capacity(submits.len().max(1));
    let mut id = state.submissions.next_id;

    for submit in submits {
        let waits = submit
            .wait_semaphores
            .iter()
            .filter_map(|s| match signalers.get(s) {
                Some(signaler) => *signaler,
                None => state.objects.semaphores.get(s).and_then(|sem| sem.signaler),
            })
            .collect();

        let mut command_buffers = Vec::new();
        let mut accesses = Vec::new();
        for handle in &submit.command_buffers {
            command_buffers.push(*handle);
            if let Some(cb) = state.command_buffers.get(handle) {
                command_buffers.extend(cb.secondaries.iter().copied());
                accesses.extend(cb.accesses.iter().copied());
            }
        }
        let writes = accesses.iter().filter(|a| a.write).map(|a| a.resource).collect();

        for s in &submit.wait_semaphores {
            signalers.insert(*s, None);
        }
        for s in &submit.signal_semaphores {
            signalers.insert(*s, Some(id));
        }

        planned.push(Submission {
            id,
            queue,
            command_buffers,
            fence: None,
            waits,
            wait_semaphores: submit.wait_semaphores.clone(),
            signal_semaphores: submit.signal_semaphores.clone(),
            accesses,
            writes,
        });
        id += 1;
    }

    if !fence.is_null() {
        if planned.is_empty() {
            planned.push(Submission {
                id,
                queue,
                command_buffers: Vec::new(),
                fence: None,
                waits: Vec::new(),
                wait_semaphores: Vec::new(),
                signal_semaphores: Vec::new(),
                accesses: Vec::new(),
                writes: HashSet::new(),
            });
        }
        if let Some(last) = planned.last_mut() {
            last.fence = Some(fence);
        }
    }
    planned
}

fn hazard(state: &DeviceState, message_id: &'static str, message: String, resource: Handle, queue: Handle) -> Diagnostic {
    let resource_type = if state.objects.images.contains_key(&resource) {
        ObjectType::Image
    } else {
        ObjectType::Buffer
    };
    Diagnostic::new(
        ErrorKind::SynchronizationHazard,
        message_id,
        format!("{}: {}", EntryPoint::QueueSubmit.name(), message),
    )
    .with_object(ObjectType::Queue, queue)
    .with_object(resource_type, resource)
}

pub(crate) fn validate_submit(
    state: &DeviceState,
    queue: Handle,
    submits: &[SubmitInfo],
    fence: Handle,
    strictness: HazardStrictness,
    issues: &mut Vec<Diagnostic>,
) {
    let entry = EntryPoint::QueueSubmit;

    if let Some(fence_state) = state.objects.fences.get(&fence) {
        if fence_state.in_flight.is_some() {
            issues.push(
                usage_error(
                    entry,
                    "CoreValidation-Fence-InFlight",
                    format!("fence {} is already in use by a pending submission", fence),
                )
                .with_object(ObjectType::Fence, fence),
            );
        } else if fence_state.signaled {
            issues.push(
                usage_error(
                    entry,
                    "CoreValidation-Fence-Signaled",
                    format!("fence {} is signaled and must be reset before submission", fence),
                )
                .with_object(ObjectType::Fence, fence),
            );
        }
    }

    let queue_family = state.queues.get(&queue).map(|q| q.family);
    let mut layouts = state.image_layouts.clone();
    let mut submitted: HashMap<Handle, u32> = HashMap::new();
    let mut signaled: HashSet<Handle> = HashSet::new();

    for (batch, submit) in submits.iter().enumerate() {
        for semaphore in &submit.wait_semaphores {
            let pending_signal = state
                .objects
                .semaphores
                .get(semaphore)
                .map_or(true, |s| s.signaled || s.signaler.is_some());
            if !pending_signal && !signaled.remove(semaphore) {
                issues.push(
                    usage_error(
                        entry,
                        "CoreValidation-Semaphore-NotSignaled",
                        format!(
                            "pSubmits[{}] waits on semaphore {}, which has no pending signal",
                            batch, semaphore
                        ),
                    )
                    .with_object(ObjectType::Semaphore, *semaphore),
                );
            }
        }
        signaled.extend(submit.signal_semaphores.iter().copied());

        for &handle in &submit.command_buffers {
            let Some(cb) = state.command_buffers.get(&handle) else {
                continue;
            };
            let cb_diag = |message_id: &'static str, message: String| {
                usage_error(entry, message_id, format!("pSubmits[{}]: {}", batch, message))
                    .with_object(ObjectType::CommandBuffer, handle)
            };

            if cb.level != vk::CommandBufferLevel::PRIMARY {
                issues.push(cb_diag(
                    "CoreValidation-Submit-SecondaryCommandBuffer",
                    format!("command buffer {} is a secondary command buffer", handle),
                ));
            }
            let times = submitted.entry(handle).or_insert(0);
            *times += 1;
            let in_flight = cb.status == CommandBufferStatus::Pending || *times > 1;
            if cb.status == CommandBufferStatus::Executable || cb.status == CommandBufferStatus::Pending {
                if in_flight && !cb.allows_simultaneous_use() {
                    issues.push(cb_diag(
                        "CoreValidation-CommandBuffer-Pending",
                        format!(
                            "command buffer {} is already pending and was not begun with SIMULTANEOUS_USE",
                            handle
                        ),
                    ));
                }
            } else {
                let reason = match cb.invalidated_by {
                    Some(by) if cb.status == CommandBufferStatus::Invalid => {
                        format!(" (invalidated by the destruction or update of {})", by)
                    }
                    _ => String::new(),
                };
                issues.push(cb_diag(
                    "CoreValidation-Submit-NotExecutable",
                    format!("command buffer {} is {:?}{}", handle, cb.status, reason),
                ));
            }

            if let (Some(family), Some(pool)) = (queue_family, state.objects.command_pools.get(&cb.pool)) {
                if pool.queue_family_index != family {
                    issues.push(cb_diag(
                        "CoreValidation-Submit-QueueFamily",
                        format!(
                            "command buffer {} was allocated for queue family {}, queue {} is of family {}",
                            handle, pool.queue_family_index, queue, family
                        ),
                    ));
                }
            }

            let mut expectations: Vec<_> = cb.initial_layouts.iter().collect();
            expectations.sort();
            for (&image, &expected) in expectations {
                if let Some(&actual) = layouts.get(&image) {
                    if actual != expected {
                        issues.push(
                            cb_diag(
                                "CoreValidation-Submit-ImageLayout",
                                format!(
                                    "command buffer {} expects image {} in {:?}, but it is in {:?}",
                                    handle, image, expected, actual
                                ),
                            )
                            .with_object(ObjectType::Image, image),
                        );
                    }
                }
            }
            layouts.extend(cb.current_layouts.iter().map(|(k, v)| (*k, *v)));
        }
    }

    if strictness != HazardStrictness::Off {
        check_hazards(state, queue, submits, fence, strictness, issues);
    }
}

fn check_hazards(
    state: &DeviceState,
    queue: Handle,
    submits: &[SubmitInfo],
    fence: Handle,
    strictness: HazardStrictness,
    issues: &mut Vec<Diagnostic>,
) {
    let planned = plan(state, queue, submits, fence);
    for (i, batch) in planned.iter().enumerate() {
        let candidates: Vec<&Submission> = state.submissions.pending().chain(&planned[..i]).collect();
        let before = ancestors(&candidates, &batch.waits);
        let mut reported = HashSet::new();

        for access in &batch.accesses {
            if reported.contains(&access.resource) {
                continue;
            }
            let conflict = candidates.iter().find(|earlier| {
                if !earlier.writes.contains(&access.resource) {
                    return false;
                }
                if earlier.queue != queue {
                    !before.contains(&earlier.id)
                } else {
                    strictness == HazardStrictness::Strict && !access.after_barrier
                }
            });
            let Some(earlier) = conflict else {
                continue;
            };
            reported.insert(access.resource);
            let what = if access.write { "writes" } else { "reads" };
            let mut diag = if earlier.queue != queue {
                hazard(
                    state,
                    "CoreValidation-Hazard-CrossQueue",
                    format!(
                        "pSubmits[{}] {} {}, which a pending submission on queue {} writes, with no semaphore chain between them",
                        i, what, access.resource, earlier.queue
                    ),
                    access.resource,
                    queue,
                )
            } else {
                hazard(
                    state,
                    "CoreValidation-Hazard-SameQueue",
                    format!(
                        "pSubmits[{}] {} {}, which an earlier submission on the same queue writes, with no pipeline barrier before the access",
                        i, what, access.resource
                    ),
                    access.resource,
                    queue,
                )
            };
            if let Some(cb) = batch.command_buffers.first() {
                diag = diag.with_object(ObjectType::CommandBuffer, *cb);
            }
            issues.push(diag);
        }
    }
}

/// Record a successful `vkQueueSubmit`.
pub(crate) fn commit(state: &mut DeviceState, queue: Handle, submits: &[SubmitInfo], fence: Handle) {
    let planned = plan(state, queue, submits, fence);
    for submission in planned {
        for handle in &submission.command_buffers {
            if let Some(cb) = state.command_buffers.get_mut(handle) {
                cb.mark_pending();
                state
                    .image_layouts
                    .extend(cb.current_layouts.iter().map(|(k, v)| (*k, *v)));
            }
        }
        for semaphore in &submission.wait_semaphores {
            if let Some(s) = state.objects.semaphores.get_mut(semaphore) {
                *s = SemaphoreState::default();
            }
        }
        for semaphore in &submission.signal_semaphores {
            if let Some(s) = state.objects.semaphores.get_mut(semaphore) {
                s.signaled = true;
                s.signaler = Some(submission.id);
            }
        }
        if let Some(fence) = submission.fence {
            if let Some(f) = state.objects.fences.get_mut(&fence) {
                f.in_flight = Some(submission.id);
            }
        }
        state.submissions.next_id = submission.id + 1;
        tracing::trace!(id = submission.id, queue = %submission.queue, "submission pending");
        state.submissions.pending.insert(submission.id, submission);
    }
}

fn retire(state: &mut DeviceState, ids: Vec<u64>) {
    for id in ids {
        let Some(submission) = state.submissions.pending.remove(&id) else {
            continue;
        };
        for handle in &submission.command_buffers {
            if let Some(cb) = state.command_buffers.get_mut(handle) {
                cb.complete();
            }
        }
        if let Some(fence) = submission.fence {
            if let Some(f) = state.objects.fences.get_mut(&fence) {
                f.signaled = true;
                f.in_flight = None;
            }
        }
        for semaphore in &submission.signal_semaphores {
            if let Some(s) = state.objects.semaphores.get_mut(semaphore) {
                if s.signaler == Some(id) {
                    s.signaler = None;
                }
            }
        }
        tracing::trace!(id, "submission retired");
    }
}

/// A fence was observed signaled: its submission and everything submitted
/// before it on the same queue have completed.
pub(crate) fn retire_fence(state: &mut DeviceState, fence: Handle) {
    let last = state
        .submissions
        .pending
        .values()
        .find(|s| s.fence == Some(fence))
        .map(|s| (s.id, s.queue));
    if let Some((id, queue)) = last {
        let ids = state
            .submissions
            .pending
            .values()
            .filter(|s| s.queue == queue && s.id <= id)
            .map(|s| s.id)
            .collect();
        retire(state, ids);
    }
    if let Some(f) = state.objects.fences.get_mut(&fence) {
        f.signaled = true;
        f.in_flight = None;
    }
}

pub(crate) fn retire_queue(state: &mut DeviceState, queue: Handle) {
    let ids = state
        .submissions
        .pending
        .values()
        .filter(|s| s.queue == queue)
        .map(|s| s.id)
        .collect();
    retire(state, ids);
}

pub(crate) fn retire_all(state: &mut DeviceState) {
    let ids = state.submissions.pending.keys().copied().collect();
    retire(state, ids);
}

/// Fence calls that must not touch a fence of a pending submission.
pub(crate) fn validate_fences(state: &DeviceState, cmd: &VulkanCommand, issues: &mut Vec<Diagnostic>) {
    let entry = cmd.entry_point();
    let fences: &[Handle] = match cmd {
        VulkanCommand::ResetFences { fences, .. } => fences,
        VulkanCommand::DestroyFence { fence, .. } => std::slice::from_ref(fence),
        _ => return,
    };
    for fence in fences {
        if state
            .objects
            .fences
            .get(fence)
            .is_some_and(|f| f.in_flight.is_some())
        {
            issues.push(
                usage_error(
                    entry,
                    "CoreValidation-Fence-InFlight",
                    format!("fence {} is in use by a pending submission", fence),
                )
                .with_object(ObjectType::Fence, *fence),
            );
        }
    }
}

pub(crate) fn update(state: &mut DeviceState, cmd: &VulkanCommand, result: vk::Result) {
    match cmd {
        VulkanCommand::GetDeviceQueue { .. } => {}
        VulkanCommand::QueueSubmit { queue, submits, fence } => commit(state, *queue, submits, *fence),
        VulkanCommand::QueueWaitIdle { queue } => retire_queue(state, *queue),
        VulkanCommand::DeviceWaitIdle { .. } => retire_all(state),
        VulkanCommand::GetFenceStatus { fence, .. } if result == vk::Result::SUCCESS => retire_fence(state, *fence),
        VulkanCommand::WaitForFences { fences, wait_all, .. } if result == vk::Result::SUCCESS => {
            if *wait_all || fences.len() == 1 {
                for fence in fences {
                    retire_fence(state, *fence);
                }
            }
        }
        VulkanCommand::ResetFences { fences, .. } => {
            for fence in fences {
                if let Some(f) = state.objects.fences.get_mut(fence) {
                    f.signaled = false;
                }
            }
        }
        _ => {}
    }
}
