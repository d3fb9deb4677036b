//! Render pass shadows, compatibility, and the render pass scope of a
//! command buffer.

use std::sync::Arc;

use ash::vk;
use vkguard_api::vulkan_commands::{AttachmentReference, Rect2D, RenderPassCreateInfo};
use vkguard_api::{Handle, ObjectType};

use super::command_buffer::{Recorder, RenderPassScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentState {
    pub format: vk::Format,
    pub samples: u32,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

/// Attachment indices referenced by one subpass; `None` is unused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubpassState {
    pub input: Vec<Option<u32>>,
    pub color: Vec<Option<u32>>,
    pub resolve: Vec<Option<u32>>,
    pub depth_stencil: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassState {
    pub attachments: Vec<AttachmentState>,
    pub subpasses: Vec<SubpassState>,
}

fn reference_index(reference: &AttachmentReference) -> Option<u32> {
    (reference.attachment != vk::ATTACHMENT_UNUSED).then_some(reference.attachment)
}

impl RenderPassState {
    pub fn from_create_info(info: &RenderPassCreateInfo) -> Self {
        let attachments = info
            .attachments
            .iter()
            .map(|a| AttachmentState {
                format: vk::Format::from_raw(a.format),
                samples: a.samples,
                initial_layout: vk::ImageLayout::from_raw(a.initial_layout),
                final_layout: vk::ImageLayout::from_raw(a.final_layout),
            })
            .collect();
        let subpasses = info
            .subpasses
            .iter()
            .map(|s| SubpassState {
                input: s.input_attachments.iter().map(reference_index).collect(),
                color: s.color_attachments.iter().map(reference_index).collect(),
                resolve: s.resolve_attachments.iter().map(reference_index).collect(),
                depth_stencil: s.depth_stencil_attachment.as_ref().and_then(reference_index),
            })
            .collect();
        Self {
            attachments,
            subpasses,
        }
    }

    fn attachment_key(&self, index: Option<u32>) -> Option<(vk::Format, u32)> {
        let attachment = self.attachments.get(index? as usize)?;
        Some((attachment.format, attachment.samples))
    }

    fn references_match(&self, other: &Self, ours: &[Option<u32>], theirs: &[Option<u32>]) -> bool {
        let len = ours.len().max(theirs.len());
        (0..len).all(|i| {
            let a = ours.get(i).copied().flatten();
            let b = theirs.get(i).copied().flatten();
            self.attachment_key(a) == other.attachment_key(b)
        })
    }

    /// Two render passes are compatible when every subpass references
    /// attachments of the same format and sample count, slot by slot.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.subpasses.len() == other.subpasses.len()
            && self.subpasses.iter().zip(&other.subpasses).all(|(a, b)| {
                self.references_match(other, &a.input, &b.input)
                    && self.references_match(other, &a.color, &b.color)
                    && self.references_match(other, &a.resolve, &b.resolve)
                    && self.attachment_key(a.depth_stencil) == other.attachment_key(b.depth_stencil)
            })
    }
}

#[derive(Debug, Clone)]
pub struct FramebufferState {
    pub render_pass: Handle,
    pub render_pass_state: Arc<RenderPassState>,
    pub attachments: Vec<Handle>,
    /// width, height, layers
    pub extent: [u32; 3],
}

pub(crate) fn begin(rec: &mut Recorder<'_>, render_pass: Handle, framebuffer: Handle, render_area: &Rect2D) {
    if rec.cb.level != vk::CommandBufferLevel::PRIMARY {
        rec.usage(
            "CoreValidation-RenderPass-SecondaryBegin",
            "render pass instances can only begin in primary command buffers".to_string(),
        );
    }
    if let Some(active) = &rec.cb.render_pass {
        let active = active.render_pass;
        rec.usage(
            "CoreValidation-RenderPass-Nested",
            format!("render pass {} is already active", active),
        );
        return;
    }

    let objects = rec.objects;
    let (Some(rp), Some(fb)) = (objects.render_passes.get(&render_pass), objects.framebuffers.get(&framebuffer)) else {
        return;
    };
    rec.reference(render_pass);
    rec.reference(framebuffer);

    if fb.render_pass != render_pass && !fb.render_pass_state.is_compatible(rp) {
        rec.usage(
            "CoreValidation-RenderPass-FramebufferIncompatible",
            format!(
                "framebuffer {} was created for render pass {}, which is not compatible with {}",
                framebuffer, fb.render_pass, render_pass
            ),
        )
        .objects
        .push((ObjectType::Framebuffer, framebuffer));
    }
    if fb.attachments.len() != rp.attachments.len() {
        rec.usage(
            "CoreValidation-RenderPass-AttachmentCount",
            format!(
                "framebuffer {} has {} attachments, render pass {} declares {}",
                framebuffer,
                fb.attachments.len(),
                render_pass,
                rp.attachments.len()
            ),
        );
    }

    let within = (0..2).all(|axis| {
        let offset = render_area.offset[axis];
        offset >= 0 && offset as u64 + render_area.extent[axis] as u64 <= fb.extent[axis] as u64
    });
    if !within {
        rec.usage(
            "CoreValidation-RenderPass-RenderArea",
            format!(
                "renderArea offset {:?} extent {:?} exceeds the framebuffer extent {}x{}",
                render_area.offset, render_area.extent, fb.extent[0], fb.extent[1]
            ),
        );
    }

    let mut attachment_images = Vec::with_capacity(fb.attachments.len());
    for (index, &view) in fb.attachments.iter().enumerate() {
        rec.reference(view);
        let image = objects.image_of_view(view);
        if let (Some(image), Some(attachment)) = (image, rp.attachments.get(index)) {
            rec.reference(image);
            if attachment.initial_layout != vk::ImageLayout::UNDEFINED {
                if let Some(current) = rec.expect_layout(image, attachment.initial_layout) {
                    rec.usage(
                        "CoreValidation-RenderPass-AttachmentLayout",
                        format!(
                            "attachment {} image {} is in {:?}, the render pass expects {:?}",
                            index, image, current, attachment.initial_layout
                        ),
                    );
                }
            }
            rec.access(image, true);
        }
        attachment_images.push(image);
    }

    rec.cb.render_pass = Some(RenderPassScope {
        render_pass,
        state: rp.clone(),
        framebuffer,
        subpass: 0,
        attachment_images,
    });
}

pub(crate) fn next_subpass(rec: &mut Recorder<'_>) {
    let Some(scope) = rec.cb.render_pass.as_mut() else {
        rec.usage(
            "CoreValidation-RenderPass-NotActive",
            "no render pass instance is active".to_string(),
        );
        return;
    };
    let count = scope.state.subpasses.len() as u32;
    if scope.subpass + 1 >= count {
        let subpass = scope.subpass;
        rec.usage(
            "CoreValidation-RenderPass-SubpassIndex",
            format!("subpass {} is the last of {} subpasses", subpass, count),
        );
        return;
    }
    scope.subpass += 1;
}

pub(crate) fn end(rec: &mut Recorder<'_>) {
    let Some(scope) = rec.cb.render_pass.take() else {
        rec.usage(
            "CoreValidation-RenderPass-NotActive",
            "no render pass instance is active".to_string(),
        );
        return;
    };
    let count = scope.state.subpasses.len() as u32;
    if scope.subpass + 1 < count {
        rec.usage(
            "CoreValidation-RenderPass-NotLastSubpass",
            format!("the active subpass is {} of {}", scope.subpass, count),
        );
    }
    for (image, attachment) in scope.attachment_images.iter().zip(&scope.state.attachments) {
        if let Some(image) = image {
            rec.cb.current_layouts.insert(*image, attachment.final_layout);
        }
    }
}
