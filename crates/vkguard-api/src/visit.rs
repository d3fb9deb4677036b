//! Per-argument handle visitors.
//!
//! Every handle a command carries is visited together with a [`HandleArg`]
//! describing it: the argument name, the object category it must refer to,
//! and the registry-style annotations (`optional`, `externsync`, destroyed).
//! Both the shared and the mutable visitor expand from one match body, so
//! they cannot drift apart.

use bitflags::bitflags;

use crate::handle::{Handle, ObjectType};
use crate::vulkan_commands::*;

bitflags! {
    /// Annotations on a handle argument.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ArgFlags: u8 {
        /// `VK_NULL_HANDLE` is a legal value.
        const OPTIONAL = 1 << 0;
        /// The application must synchronize access to the object externally.
        const EXTERN_SYNC = 1 << 1;
        /// The call ends the object's lifetime.
        const DESTROYED = 1 << 2;
    }
}

/// Description of one handle argument of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleArg {
    pub name: &'static str,
    pub object_type: ObjectType,
    pub flags: ArgFlags,
}

impl HandleArg {
    pub const fn new(name: &'static str, object_type: ObjectType, flags: ArgFlags) -> Self {
        Self { name, object_type, flags }
    }

    pub fn is_optional(&self) -> bool {
        self.flags.contains(ArgFlags::OPTIONAL)
    }

    pub fn is_extern_sync(&self) -> bool {
        self.flags.contains(ArgFlags::EXTERN_SYNC)
    }

    pub fn is_destroyed(&self) -> bool {
        self.flags.contains(ArgFlags::DESTROYED)
    }
}

const NONE: ArgFlags = ArgFlags::empty();
const SYNC: ArgFlags = ArgFlags::EXTERN_SYNC;
const OPT: ArgFlags = ArgFlags::OPTIONAL;
const OPT_SYNC: ArgFlags = ArgFlags::OPTIONAL.union(ArgFlags::EXTERN_SYNC);
const DESTROY: ArgFlags = ArgFlags::OPTIONAL
    .union(ArgFlags::EXTERN_SYNC)
    .union(ArgFlags::DESTROYED);

macro_rules! arg {
    ($name:literal, $ty:ident, $flags:expr) => {
        HandleArg::new($name, ObjectType::$ty, $flags)
    };
}

macro_rules! visit_command_handles {
    ($cmd:expr, $f:ident) => {
        match $cmd {
            VulkanCommand::CreateInstance { .. } => {}
            VulkanCommand::DestroyInstance { instance } => {
                $f(arg!("instance", Instance, DESTROY), instance);
            }
            VulkanCommand::EnumeratePhysicalDevices { instance } => {
                $f(arg!("instance", Instance, NONE), instance);
            }

            VulkanCommand::CreateDevice { physical_device, .. } => {
                $f(arg!("physicalDevice", PhysicalDevice, NONE), physical_device);
            }
            VulkanCommand::DestroyDevice { device } => {
                $f(arg!("device", Device, DESTROY), device);
            }
            VulkanCommand::GetDeviceQueue { device, .. }
            | VulkanCommand::DeviceWaitIdle { device }
            | VulkanCommand::CreateSemaphore { device }
            | VulkanCommand::CreateFence { device, .. }
            | VulkanCommand::CreateCommandPool { device, .. }
            | VulkanCommand::CreateBuffer { device, .. }
            | VulkanCommand::CreateSampler { device, .. }
            | VulkanCommand::CreateShaderModule { device, .. }
            | VulkanCommand::CreateDescriptorPool { device, .. }
            | VulkanCommand::AllocateMemory { device, .. } => {
                $f(arg!("device", Device, NONE), device);
            }

            VulkanCommand::QueueSubmit { queue, submits, fence } => {
                $f(arg!("queue", Queue, SYNC), queue);
                for SubmitInfo { wait_semaphores, command_buffers, signal_semaphores, .. } in submits {
                    for semaphore in wait_semaphores {
                        $f(arg!("pSubmits.pWaitSemaphores", Semaphore, NONE), semaphore);
                    }
                    for cb in command_buffers {
                        $f(arg!("pSubmits.pCommandBuffers", CommandBuffer, NONE), cb);
                    }
                    for semaphore in signal_semaphores {
                        $f(arg!("pSubmits.pSignalSemaphores", Semaphore, NONE), semaphore);
                    }
                }
                $f(arg!("fence", Fence, OPT_SYNC), fence);
            }
            VulkanCommand::QueueWaitIdle { queue } => {
                $f(arg!("queue", Queue, SYNC), queue);
            }

            VulkanCommand::FreeMemory { device, memory } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("memory", DeviceMemory, DESTROY), memory);
            }
            VulkanCommand::MapMemory { device, memory, .. }
            | VulkanCommand::UnmapMemory { device, memory } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("memory", DeviceMemory, SYNC), memory);
            }

            VulkanCommand::DestroyBuffer { device, buffer } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("buffer", Buffer, DESTROY), buffer);
            }
            VulkanCommand::BindBufferMemory { device, buffer, memory, .. } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("buffer", Buffer, SYNC), buffer);
                $f(arg!("memory", DeviceMemory, NONE), memory);
            }

            VulkanCommand::CreateImage { device, .. } => {
                $f(arg!("device", Device, NONE), device);
            }
            VulkanCommand::DestroyImage { device, image } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("image", Image, DESTROY), image);
            }
            VulkanCommand::BindImageMemory { device, image, memory, .. } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("image", Image, SYNC), image);
                $f(arg!("memory", DeviceMemory, NONE), memory);
            }
            VulkanCommand::CreateImageView { device, create_info } => {
                $f(arg!("device", Device, NONE), device);
                let ImageViewCreateInfo { image, .. } = create_info;
                $f(arg!("pCreateInfo.image", Image, NONE), image);
            }
            VulkanCommand::DestroyImageView { device, image_view } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("imageView", ImageView, DESTROY), image_view);
            }
            VulkanCommand::DestroySampler { device, sampler } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("sampler", Sampler, DESTROY), sampler);
            }

            VulkanCommand::DestroyShaderModule { device, shader_module } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("shaderModule", ShaderModule, DESTROY), shader_module);
            }

            VulkanCommand::CreateDescriptorSetLayout { device, bindings, .. } => {
                $f(arg!("device", Device, NONE), device);
                for DescriptorSetLayoutBinding { immutable_samplers, .. } in bindings {
                    for sampler in immutable_samplers {
                        $f(arg!("pBindings.pImmutableSamplers", Sampler, NONE), sampler);
                    }
                }
            }
            VulkanCommand::DestroyDescriptorSetLayout { device, layout } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("descriptorSetLayout", DescriptorSetLayout, DESTROY), layout);
            }
            VulkanCommand::CreatePipelineLayout { device, set_layouts, .. } => {
                $f(arg!("device", Device, NONE), device);
                for layout in set_layouts {
                    $f(arg!("pSetLayouts", DescriptorSetLayout, NONE), layout);
                }
            }
            VulkanCommand::DestroyPipelineLayout { device, layout } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("pipelineLayout", PipelineLayout, DESTROY), layout);
            }

            VulkanCommand::CreateGraphicsPipelines { device, create_infos } => {
                $f(arg!("device", Device, NONE), device);
                for GraphicsPipelineCreateInfo { stages, layout, render_pass, .. } in create_infos {
                    for PipelineShaderStageCreateInfo { module, .. } in stages {
                        $f(arg!("pCreateInfos.pStages.module", ShaderModule, NONE), module);
                    }
                    $f(arg!("pCreateInfos.layout", PipelineLayout, NONE), layout);
                    $f(arg!("pCreateInfos.renderPass", RenderPass, NONE), render_pass);
                }
            }
            VulkanCommand::CreateComputePipelines { device, create_infos } => {
                $f(arg!("device", Device, NONE), device);
                for ComputePipelineCreateInfo {
                    stage: PipelineShaderStageCreateInfo { module, .. },
                    layout,
                    ..
                } in create_infos
                {
                    $f(arg!("pCreateInfos.stage.module", ShaderModule, NONE), module);
                    $f(arg!("pCreateInfos.layout", PipelineLayout, NONE), layout);
                }
            }
            VulkanCommand::DestroyPipeline { device, pipeline } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("pipeline", Pipeline, DESTROY), pipeline);
            }

            VulkanCommand::DestroyDescriptorPool { device, pool } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("descriptorPool", DescriptorPool, DESTROY), pool);
            }
            VulkanCommand::ResetDescriptorPool { device, pool } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("descriptorPool", DescriptorPool, SYNC), pool);
            }
            VulkanCommand::AllocateDescriptorSets { device, descriptor_pool, set_layouts } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("pAllocateInfo.descriptorPool", DescriptorPool, SYNC), descriptor_pool);
                for layout in set_layouts {
                    $f(arg!("pAllocateInfo.pSetLayouts", DescriptorSetLayout, NONE), layout);
                }
            }
            VulkanCommand::FreeDescriptorSets { device, descriptor_pool, descriptor_sets } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("descriptorPool", DescriptorPool, SYNC), descriptor_pool);
                for set in descriptor_sets {
                    $f(arg!("pDescriptorSets", DescriptorSet, DESTROY), set);
                }
            }
            VulkanCommand::UpdateDescriptorSets { device, writes } => {
                $f(arg!("device", Device, NONE), device);
                for WriteDescriptorSet { dst_set, image_infos, buffer_infos, .. } in writes {
                    $f(arg!("pDescriptorWrites.dstSet", DescriptorSet, SYNC), dst_set);
                    for DescriptorImageInfo { sampler, image_view, .. } in image_infos {
                        $f(arg!("pDescriptorWrites.pImageInfo.sampler", Sampler, OPT), sampler);
                        $f(arg!("pDescriptorWrites.pImageInfo.imageView", ImageView, OPT), image_view);
                    }
                    for DescriptorBufferInfo { buffer, .. } in buffer_infos {
                        $f(arg!("pDescriptorWrites.pBufferInfo.buffer", Buffer, NONE), buffer);
                    }
                }
            }

            VulkanCommand::CreateRenderPass { device, .. } => {
                $f(arg!("device", Device, NONE), device);
            }
            VulkanCommand::DestroyRenderPass { device, render_pass } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("renderPass", RenderPass, DESTROY), render_pass);
            }
            VulkanCommand::CreateFramebuffer { device, create_info } => {
                $f(arg!("device", Device, NONE), device);
                let FramebufferCreateInfo { render_pass, attachments, .. } = create_info;
                $f(arg!("pCreateInfo.renderPass", RenderPass, NONE), render_pass);
                for view in attachments {
                    $f(arg!("pCreateInfo.pAttachments", ImageView, NONE), view);
                }
            }
            VulkanCommand::DestroyFramebuffer { device, framebuffer } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("framebuffer", Framebuffer, DESTROY), framebuffer);
            }

            VulkanCommand::DestroyCommandPool { device, command_pool } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("commandPool", CommandPool, DESTROY), command_pool);
            }
            VulkanCommand::ResetCommandPool { device, command_pool, .. } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("commandPool", CommandPool, SYNC), command_pool);
            }
            VulkanCommand::AllocateCommandBuffers { device, command_pool, .. } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("pAllocateInfo.commandPool", CommandPool, SYNC), command_pool);
            }
            VulkanCommand::FreeCommandBuffers { device, command_pool, command_buffers } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("commandPool", CommandPool, SYNC), command_pool);
                for cb in command_buffers {
                    $f(arg!("pCommandBuffers", CommandBuffer, DESTROY), cb);
                }
            }
            VulkanCommand::BeginCommandBuffer { command_buffer, inheritance, .. } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                if let Some(CommandBufferInheritanceInfo { render_pass, framebuffer, .. }) = inheritance {
                    $f(arg!("pInheritanceInfo.renderPass", RenderPass, OPT), render_pass);
                    $f(arg!("pInheritanceInfo.framebuffer", Framebuffer, OPT), framebuffer);
                }
            }
            VulkanCommand::EndCommandBuffer { command_buffer }
            | VulkanCommand::ResetCommandBuffer { command_buffer, .. }
            | VulkanCommand::CmdSetViewport { command_buffer, .. }
            | VulkanCommand::CmdSetScissor { command_buffer, .. }
            | VulkanCommand::CmdDraw { command_buffer, .. }
            | VulkanCommand::CmdDrawIndexed { command_buffer, .. }
            | VulkanCommand::CmdDispatch { command_buffer, .. }
            | VulkanCommand::CmdNextSubpass { command_buffer, .. }
            | VulkanCommand::CmdEndRenderPass { command_buffer } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
            }

            VulkanCommand::CmdBindPipeline { command_buffer, pipeline, .. } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                $f(arg!("pipeline", Pipeline, NONE), pipeline);
            }
            VulkanCommand::CmdBindDescriptorSets { command_buffer, layout, descriptor_sets, .. } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                $f(arg!("layout", PipelineLayout, NONE), layout);
                for set in descriptor_sets {
                    $f(arg!("pDescriptorSets", DescriptorSet, NONE), set);
                }
            }
            VulkanCommand::CmdBindVertexBuffers { command_buffer, buffers, .. } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                for buffer in buffers {
                    $f(arg!("pBuffers", Buffer, NONE), buffer);
                }
            }
            VulkanCommand::CmdBindIndexBuffer { command_buffer, buffer, .. } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                $f(arg!("buffer", Buffer, NONE), buffer);
            }
            VulkanCommand::CmdCopyBuffer { command_buffer, src_buffer, dst_buffer, .. } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                $f(arg!("srcBuffer", Buffer, NONE), src_buffer);
                $f(arg!("dstBuffer", Buffer, NONE), dst_buffer);
            }
            VulkanCommand::CmdFillBuffer { command_buffer, dst_buffer, .. }
            | VulkanCommand::CmdUpdateBuffer { command_buffer, dst_buffer, .. } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                $f(arg!("dstBuffer", Buffer, NONE), dst_buffer);
            }
            VulkanCommand::CmdCopyBufferToImage { command_buffer, src_buffer, dst_image, .. } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                $f(arg!("srcBuffer", Buffer, NONE), src_buffer);
                $f(arg!("dstImage", Image, NONE), dst_image);
            }
            VulkanCommand::CmdPipelineBarrier {
                command_buffer,
                buffer_memory_barriers,
                image_memory_barriers,
                ..
            } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                for BufferMemoryBarrier { buffer, .. } in buffer_memory_barriers {
                    $f(arg!("pBufferMemoryBarriers.buffer", Buffer, NONE), buffer);
                }
                for ImageMemoryBarrier { image, .. } in image_memory_barriers {
                    $f(arg!("pImageMemoryBarriers.image", Image, NONE), image);
                }
            }
            VulkanCommand::CmdBeginRenderPass { command_buffer, render_pass, framebuffer, .. } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                $f(arg!("pRenderPassBegin.renderPass", RenderPass, NONE), render_pass);
                $f(arg!("pRenderPassBegin.framebuffer", Framebuffer, NONE), framebuffer);
            }
            VulkanCommand::CmdExecuteCommands { command_buffer, command_buffers } => {
                $f(arg!("commandBuffer", CommandBuffer, SYNC), command_buffer);
                for cb in command_buffers {
                    $f(arg!("pCommandBuffers", CommandBuffer, NONE), cb);
                }
            }

            VulkanCommand::DestroyFence { device, fence } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("fence", Fence, DESTROY), fence);
            }
            VulkanCommand::ResetFences { device, fences } => {
                $f(arg!("device", Device, NONE), device);
                for fence in fences {
                    $f(arg!("pFences", Fence, SYNC), fence);
                }
            }
            VulkanCommand::GetFenceStatus { device, fence } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("fence", Fence, NONE), fence);
            }
            VulkanCommand::WaitForFences { device, fences, .. } => {
                $f(arg!("device", Device, NONE), device);
                for fence in fences {
                    $f(arg!("pFences", Fence, NONE), fence);
                }
            }
            VulkanCommand::DestroySemaphore { device, semaphore } => {
                $f(arg!("device", Device, NONE), device);
                $f(arg!("semaphore", Semaphore, DESTROY), semaphore);
            }
        }
    };
}

macro_rules! visit_created_handles {
    ($resp:expr, $f:ident) => {
        match $resp {
            VulkanResponse::InstanceCreated { handle } => $f(ObjectType::Instance, handle),
            VulkanResponse::DeviceCreated { handle } => $f(ObjectType::Device, handle),
            VulkanResponse::QueueRetrieved { handle } => $f(ObjectType::Queue, handle),
            VulkanResponse::MemoryAllocated { handle } => $f(ObjectType::DeviceMemory, handle),
            VulkanResponse::BufferCreated { handle } => $f(ObjectType::Buffer, handle),
            VulkanResponse::ImageCreated { handle } => $f(ObjectType::Image, handle),
            VulkanResponse::ImageViewCreated { handle } => $f(ObjectType::ImageView, handle),
            VulkanResponse::SamplerCreated { handle } => $f(ObjectType::Sampler, handle),
            VulkanResponse::ShaderModuleCreated { handle } => $f(ObjectType::ShaderModule, handle),
            VulkanResponse::DescriptorSetLayoutCreated { handle } => {
                $f(ObjectType::DescriptorSetLayout, handle)
            }
            VulkanResponse::PipelineLayoutCreated { handle } => {
                $f(ObjectType::PipelineLayout, handle)
            }
            VulkanResponse::DescriptorPoolCreated { handle } => {
                $f(ObjectType::DescriptorPool, handle)
            }
            VulkanResponse::RenderPassCreated { handle } => $f(ObjectType::RenderPass, handle),
            VulkanResponse::FramebufferCreated { handle } => $f(ObjectType::Framebuffer, handle),
            VulkanResponse::CommandPoolCreated { handle } => $f(ObjectType::CommandPool, handle),
            VulkanResponse::FenceCreated { handle } => $f(ObjectType::Fence, handle),
            VulkanResponse::SemaphoreCreated { handle } => $f(ObjectType::Semaphore, handle),
            VulkanResponse::PhysicalDevices { handles } => {
                for handle in handles {
                    $f(ObjectType::PhysicalDevice, handle);
                }
            }
            VulkanResponse::PipelinesCreated { handles } => {
                for handle in handles {
                    $f(ObjectType::Pipeline, handle);
                }
            }
            VulkanResponse::DescriptorSetsAllocated { handles } => {
                for handle in handles {
                    $f(ObjectType::DescriptorSet, handle);
                }
            }
            VulkanResponse::CommandBuffersAllocated { handles } => {
                for handle in handles {
                    $f(ObjectType::CommandBuffer, handle);
                }
            }
            VulkanResponse::Success
            | VulkanResponse::Status { .. }
            | VulkanResponse::Error { .. }
            | VulkanResponse::MemoryMapped { .. } => {}
        }
    };
}

impl VulkanCommand {
    /// Visit every handle argument, in declaration order.
    pub fn for_each_handle<F>(&self, mut f: F)
    where
        F: FnMut(HandleArg, &Handle),
    {
        visit_command_handles!(self, f)
    }

    /// Visit every handle argument mutably, for in-place rewriting.
    pub fn for_each_handle_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(HandleArg, &mut Handle),
    {
        visit_command_handles!(self, f)
    }

    /// Collect every handle argument.
    pub fn handles(&self) -> Vec<(HandleArg, Handle)> {
        let mut out = Vec::new();
        self.for_each_handle(|arg, handle| out.push((arg, *handle)));
        out
    }
}

impl VulkanResponse {
    /// Visit every handle the call created.
    pub fn for_each_created<F>(&self, mut f: F)
    where
        F: FnMut(ObjectType, &Handle),
    {
        visit_created_handles!(self, f)
    }

    pub fn for_each_created_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(ObjectType, &mut Handle),
    {
        visit_created_handles!(self, f)
    }
}
