//! Descriptor set layouts, pools, updates, and the set compatibility walk.

use std::collections::{BTreeMap, BTreeSet};

use ash::vk;
use vkguard_api::vulkan_commands::WriteDescriptorSet;
use vkguard_api::{EntryPoint, Handle, ObjectType, VulkanCommand, VulkanResponse};
use vkguard_core::{Diagnostic, ErrorKind};

use super::command_buffer::{BoundSet, Recorder};
use super::state::{DescriptorResource, DescriptorSetState, LayoutBinding, Objects, PipelineState, SetLayoutState};
use super::usage_error;

/// The first binding slot at which two set layouts disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConflict {
    pub slot: u32,
    pub expected: Option<LayoutBinding>,
    pub actual: Option<LayoutBinding>,
}

fn describe(binding: Option<LayoutBinding>) -> String {
    match binding {
        Some(b) => b.to_string(),
        None => "nothing".to_string(),
    }
}

/// Walk both layouts' bindings in slot order and stop at the first slot
/// whose type, count or stage flags differ.
pub fn compare_set_layouts(expected: &SetLayoutState, actual: &SetLayoutState) -> Option<SlotConflict> {
    let slots: BTreeSet<u32> = expected.bindings.keys().chain(actual.bindings.keys()).copied().collect();
    slots.into_iter().find_map(|slot| {
        let e = expected.bindings.get(&slot).copied();
        let a = actual.bindings.get(&slot).copied();
        (e != a).then_some(SlotConflict {
            slot,
            expected: e,
            actual: a,
        })
    })
}

fn report_conflict(rec: &mut Recorder<'_>, set_index: u32, set: Handle, conflict: SlotConflict) {
    rec.report(
        ErrorKind::BindingMismatch,
        "CoreValidation-DescriptorSet-BindingMismatch",
        format!(
            "descriptor set {} bound at index {} is incompatible at binding slot {}: the set's layout declares {}, the pipeline layout expects {}",
            set,
            set_index,
            conflict.slot,
            describe(conflict.actual),
            describe(conflict.expected)
        ),
    )
    .objects
    .push((ObjectType::DescriptorSet, set));
}

pub(crate) fn bind_descriptor_sets(
    rec: &mut Recorder<'_>,
    bind_point: vk::PipelineBindPoint,
    layout: Handle,
    first_set: u32,
    sets: &[Handle],
    dynamic_offsets: &[u32],
) {
    let objects = rec.objects;
    let Some(pipeline_layout) = objects.pipeline_layouts.get(&layout) else {
        return;
    };
    rec.reference(layout);

    let declared = pipeline_layout.set_layouts.len();
    if first_set as usize + sets.len() > declared {
        rec.usage(
            "CoreValidation-DescriptorSet-SetIndexOutOfRange",
            format!(
                "firstSet {} + descriptorSetCount {} exceeds the {} set layouts of pipeline layout {}",
                first_set,
                sets.len(),
                declared,
                layout
            ),
        );
    }

    let mut dynamic_count = 0;
    for (i, &set) in sets.iter().enumerate() {
        rec.reference(set);
        // Past u32::MAX; already reported as out of range above.
        let Some(index) = u32::try_from(i).ok().and_then(|i| first_set.checked_add(i)) else {
            continue;
        };
        let Some(set_state) = objects.descriptor_sets.get(&set) else {
            continue;
        };
        dynamic_count += set_state.layout_state.dynamic_count();
        if let Some((expected_handle, expected)) = pipeline_layout.set_layouts.get(index as usize) {
            if *expected_handle != set_state.layout {
                if let Some(conflict) = compare_set_layouts(expected, &set_state.layout_state) {
                    report_conflict(rec, index, set, conflict);
                }
            }
        }
        rec.cb.bind_point_mut(bind_point).sets.insert(
            index,
            BoundSet {
                set,
                pipeline_layout: layout,
                set_layout: set_state.layout_state.clone(),
            },
        );
    }

    if dynamic_count as usize != dynamic_offsets.len() {
        rec.usage(
            "CoreValidation-DescriptorSet-DynamicOffsetCount",
            format!(
                "{} dynamic offsets were given, the bound sets contain {} dynamic descriptors",
                dynamic_offsets.len(),
                dynamic_count
            ),
        );
    }
}

fn is_written_by_shader(descriptor_type: vk::DescriptorType) -> bool {
    matches!(
        descriptor_type,
        vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_IMAGE
            | vk::DescriptorType::STORAGE_TEXEL_BUFFER
    )
}

/// Draw/dispatch-time checks of the sets a pipeline needs.
pub(crate) fn validate_bound_sets(rec: &mut Recorder<'_>, bind_point: vk::PipelineBindPoint, pipeline: &PipelineState) {
    let objects = rec.objects;
    for (index, (_, expected)) in pipeline.layout_state.set_layouts.iter().enumerate() {
        let index = index as u32;
        let Some(bound) = rec.cb.bind_point(bind_point).sets.get(&index).cloned() else {
            rec.usage(
                "CoreValidation-Draw-DescriptorSetNotBound",
                format!("the pipeline layout declares set {}, but no descriptor set is bound there", index),
            );
            continue;
        };
        if bound.pipeline_layout != pipeline.layout {
            if let Some(conflict) = compare_set_layouts(expected, &bound.set_layout) {
                report_conflict(rec, index, bound.set, conflict);
            }
        }

        let Some(set_state) = objects.descriptor_sets.get(&bound.set) else {
            rec.usage(
                "CoreValidation-Draw-DescriptorSetDestroyed",
                format!("descriptor set {} bound at index {} no longer exists", bound.set, index),
            );
            continue;
        };
        for &(_, binding) in pipeline.used_bindings.iter().filter(|(set, _)| *set == index) {
            if !set_state.is_written(binding) {
                rec.usage(
                    "CoreValidation-Draw-DescriptorNotWritten",
                    format!(
                        "set {} binding {} is used by the pipeline but descriptor set {} never wrote it",
                        index, binding, bound.set
                    ),
                )
                .objects
                .push((ObjectType::DescriptorSet, bound.set));
                continue;
            }
            let write = set_state
                .layout_state
                .bindings
                .get(&binding)
                .is_some_and(|b| is_written_by_shader(b.descriptor_type));
            let resources = set_state.written.get(&binding).into_iter().flat_map(|e| e.values());
            for resource in resources {
                check_resource_alive(rec, objects, index, binding, resource, write);
            }
        }
    }
}

fn check_resource_alive(
    rec: &mut Recorder<'_>,
    objects: &Objects,
    set_index: u32,
    binding: u32,
    resource: &DescriptorResource,
    write: bool,
) {
    let (alive, handle, object_type) = match *resource {
        DescriptorResource::Buffer { buffer, .. } => (objects.buffers.contains_key(&buffer), buffer, ObjectType::Buffer),
        DescriptorResource::Image {
            image_view, sampler, ..
        } => {
            if !sampler.is_null() && !objects.samplers.contains(&sampler) {
                (false, sampler, ObjectType::Sampler)
            } else if image_view.is_null() {
                (true, sampler, ObjectType::Sampler)
            } else {
                (objects.image_views.contains_key(&image_view), image_view, ObjectType::ImageView)
            }
        }
    };
    if !alive {
        rec.usage(
            "CoreValidation-Draw-DestroyedResource",
            format!(
                "set {} binding {} refers to {} {}, which has been destroyed",
                set_index,
                binding,
                object_type.type_name(),
                handle
            ),
        )
        .objects
        .push((object_type, handle));
        return;
    }
    rec.reference(handle);
    let resource = match object_type {
        ObjectType::ImageView => objects.image_of_view(handle),
        ObjectType::Buffer => Some(handle),
        _ => None,
    };
    if let Some(resource) = resource {
        rec.reference(resource);
        rec.access(resource, write);
    }
}

fn descriptor_usage(descriptor_type: vk::DescriptorType) -> Option<vk::BufferUsageFlags> {
    match descriptor_type {
        vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => {
            Some(vk::BufferUsageFlags::UNIFORM_BUFFER)
        }
        vk::DescriptorType::STORAGE_BUFFER | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => {
            Some(vk::BufferUsageFlags::STORAGE_BUFFER)
        }
        _ => None,
    }
}

fn check_write(objects: &Objects, index: usize, write: &WriteDescriptorSet, issues: &mut Vec<Diagnostic>) {
    let entry = EntryPoint::UpdateDescriptorSets;
    let Some(set) = objects.descriptor_sets.get(&write.dst_set) else {
        return;
    };
    let diag = |message_id: &'static str, message: String| {
        usage_error(entry, message_id, format!("pDescriptorWrites[{}]: {}", index, message))
            .with_object(ObjectType::DescriptorSet, write.dst_set)
    };

    let Some(binding) = set.layout_state.bindings.get(&write.dst_binding) else {
        issues.push(diag(
            "CoreValidation-DescriptorSet-UnknownBinding",
            format!("the set's layout has no binding {}", write.dst_binding),
        ));
        return;
    };
    let descriptor_type = vk::DescriptorType::from_raw(write.descriptor_type);
    if binding.descriptor_type != descriptor_type {
        issues.push(diag(
            "CoreValidation-DescriptorSet-TypeMismatch",
            format!(
                "binding {} is {:?}, the write uses {:?}",
                write.dst_binding, binding.descriptor_type, descriptor_type
            ),
        ));
    }
    if write.dst_array_element as u64 + write.descriptor_count as u64 > binding.count as u64 {
        issues.push(diag(
            "CoreValidation-DescriptorSet-OutOfRange",
            format!(
                "dstArrayElement {} + descriptorCount {} exceeds the {} descriptors of binding {}",
                write.dst_array_element, write.descriptor_count, binding.count, write.dst_binding
            ),
        ));
    }

    for info in &write.buffer_infos {
        let Some(buffer) = objects.buffers.get(&info.buffer) else {
            continue;
        };
        if let Some(required) = descriptor_usage(descriptor_type) {
            if !buffer.usage.contains(required) {
                issues.push(diag(
                    "CoreValidation-DescriptorSet-BufferUsage",
                    format!("buffer {} was not created with {:?} usage", info.buffer, required),
                ));
            }
        }
        let fits = info.offset < buffer.size
            && (info.range == vk::WHOLE_SIZE || info.offset.saturating_add(info.range) <= buffer.size);
        if !fits {
            issues.push(diag(
                "CoreValidation-DescriptorSet-BufferRange",
                format!(
                    "offset {} range {} exceeds the size {} of buffer {}",
                    info.offset, info.range, buffer.size, info.buffer
                ),
            ));
        }
    }
}

/// Pre-call checks of descriptor pool and set calls.
pub(crate) fn validate(objects: &Objects, cmd: &VulkanCommand, issues: &mut Vec<Diagnostic>) {
    let entry = cmd.entry_point();
    match cmd {
        VulkanCommand::AllocateDescriptorSets {
            descriptor_pool,
            set_layouts,
            ..
        } => {
            let Some(pool) = objects.descriptor_pools.get(descriptor_pool) else {
                return;
            };
            let requested = pool.sets.len() + set_layouts.len();
            if requested > pool.max_sets as usize {
                issues.push(
                    usage_error(
                        entry,
                        "CoreValidation-DescriptorPool-Exhausted",
                        format!(
                            "pool {} holds {} of {} sets, {} more were requested",
                            descriptor_pool,
                            pool.sets.len(),
                            pool.max_sets,
                            set_layouts.len()
                        ),
                    )
                    .with_object(ObjectType::DescriptorPool, *descriptor_pool),
                );
            }
        }
        VulkanCommand::FreeDescriptorSets { descriptor_pool, .. } => {
            let Some(pool) = objects.descriptor_pools.get(descriptor_pool) else {
                return;
            };
            if !pool.flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
                issues.push(
                    usage_error(
                        entry,
                        "CoreValidation-DescriptorPool-FreeNotAllowed",
                        format!("pool {} was not created with FREE_DESCRIPTOR_SET", descriptor_pool),
                    )
                    .with_object(ObjectType::DescriptorPool, *descriptor_pool),
                );
            }
        }
        VulkanCommand::UpdateDescriptorSets { writes, .. } => {
            for (index, write) in writes.iter().enumerate() {
                check_write(objects, index, write, issues);
            }
        }
        _ => {}
    }
}

/// Descriptor sets a call frees, including those freed with their pool.
pub(crate) fn freed_sets(objects: &Objects, cmd: &VulkanCommand) -> Vec<Handle> {
    match cmd {
        VulkanCommand::FreeDescriptorSets { descriptor_sets, .. } => descriptor_sets.clone(),
        VulkanCommand::ResetDescriptorPool { pool, .. } | VulkanCommand::DestroyDescriptorPool { pool, .. } => objects
            .descriptor_pools
            .get(pool)
            .map(|p| {
                let mut sets: Vec<Handle> = p.sets.iter().copied().collect();
                sets.sort();
                sets
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub(crate) fn update(objects: &mut Objects, cmd: &VulkanCommand, resp: &VulkanResponse) {
    match cmd {
        VulkanCommand::AllocateDescriptorSets {
            descriptor_pool,
            set_layouts,
            ..
        } => {
            for (set, layout) in resp.handles().into_iter().zip(set_layouts) {
                let layout_state = objects.set_layouts.get(layout).cloned().unwrap_or_default();
                objects.descriptor_sets.insert(
                    set,
                    DescriptorSetState {
                        pool: *descriptor_pool,
                        layout: *layout,
                        layout_state,
                        written: BTreeMap::new(),
                    },
                );
                if let Some(pool) = objects.descriptor_pools.get_mut(descriptor_pool) {
                    pool.sets.insert(set);
                }
            }
        }
        VulkanCommand::FreeDescriptorSets {
            descriptor_pool,
            descriptor_sets,
            ..
        } => {
            for set in descriptor_sets {
                objects.descriptor_sets.remove(set);
            }
            if let Some(pool) = objects.descriptor_pools.get_mut(descriptor_pool) {
                for set in descriptor_sets {
                    pool.sets.remove(set);
                }
            }
        }
        VulkanCommand::ResetDescriptorPool { pool, .. } => {
            if let Some(state) = objects.descriptor_pools.get_mut(pool) {
                for set in state.sets.drain() {
                    objects.descriptor_sets.remove(&set);
                }
            }
        }
        VulkanCommand::DestroyDescriptorPool { pool, .. } => {
            if let Some(state) = objects.descriptor_pools.remove(pool) {
                for set in state.sets {
                    objects.descriptor_sets.remove(&set);
                }
            }
        }
        VulkanCommand::UpdateDescriptorSets { writes, .. } => {
            for write in writes {
                record_write(objects, write);
            }
        }
        _ => {}
    }
}

fn record_write(objects: &mut Objects, write: &WriteDescriptorSet) {
    let Some(set) = objects.descriptor_sets.get_mut(&write.dst_set) else {
        return;
    };
    let elements = set.written.entry(write.dst_binding).or_default();
    let resources = write
        .buffer_infos
        .iter()
        .map(|info| DescriptorResource::Buffer {
            buffer: info.buffer,
            offset: info.offset,
            range: info.range,
        })
        .chain(write.image_infos.iter().map(|info| DescriptorResource::Image {
            image_view: info.image_view,
            sampler: info.sampler,
            layout: vk::ImageLayout::from_raw(info.image_layout),
        }));
    for (i, resource) in resources.take(write.descriptor_count as usize).enumerate() {
        let Some(element) = u32::try_from(i).ok().and_then(|i| write.dst_array_element.checked_add(i)) else {
            break;
        };
        elements.insert(element, resource);
    }
}
