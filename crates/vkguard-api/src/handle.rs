use std::fmt;

use ash::vk;
use serde::{Deserialize, Serialize};

/// An opaque 64-bit object handle as it crosses a layer boundary.
///
/// Whether the value is a driver handle or a layer-minted wrapped handle
/// depends on which side of the object wrapper it is observed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
         Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u64);

impl Handle {
    /// The null handle (`VK_NULL_HANDLE`).
    pub const NULL: Handle = Handle(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Convert from any typed `ash` handle.
    pub fn from_vk<H: vk::Handle>(handle: H) -> Self {
        Self(handle.as_raw())
    }

    /// Convert into a typed `ash` handle.
    pub fn to_vk<H: vk::Handle>(self) -> H {
        H::from_raw(self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Object category of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
         Serialize, Deserialize)]
pub enum ObjectType {
    Instance,
    PhysicalDevice,
    Device,
    Queue,
    CommandPool,
    CommandBuffer,
    DeviceMemory,
    Buffer,
    Image,
    ImageView,
    Sampler,
    ShaderModule,
    Pipeline,
    PipelineLayout,
    DescriptorSetLayout,
    DescriptorPool,
    DescriptorSet,
    RenderPass,
    Framebuffer,
    Fence,
    Semaphore,
}

impl ObjectType {
    /// Dispatchable objects carry the loader dispatch key and are never wrapped.
    pub fn is_dispatchable(self) -> bool {
        matches!(
            self,
            ObjectType::Instance
                | ObjectType::PhysicalDevice
                | ObjectType::Device
                | ObjectType::Queue
                | ObjectType::CommandBuffer
        )
    }

    pub fn to_vk(self) -> vk::ObjectType {
        match self {
            ObjectType::Instance => vk::ObjectType::INSTANCE,
            ObjectType::PhysicalDevice => vk::ObjectType::PHYSICAL_DEVICE,
            ObjectType::Device => vk::ObjectType::DEVICE,
            ObjectType::Queue => vk::ObjectType::QUEUE,
            ObjectType::CommandPool => vk::ObjectType::COMMAND_POOL,
            ObjectType::CommandBuffer => vk::ObjectType::COMMAND_BUFFER,
            ObjectType::DeviceMemory => vk::ObjectType::DEVICE_MEMORY,
            ObjectType::Buffer => vk::ObjectType::BUFFER,
            ObjectType::Image => vk::ObjectType::IMAGE,
            ObjectType::ImageView => vk::ObjectType::IMAGE_VIEW,
            ObjectType::Sampler => vk::ObjectType::SAMPLER,
            ObjectType::ShaderModule => vk::ObjectType::SHADER_MODULE,
            ObjectType::Pipeline => vk::ObjectType::PIPELINE,
            ObjectType::PipelineLayout => vk::ObjectType::PIPELINE_LAYOUT,
            ObjectType::DescriptorSetLayout => vk::ObjectType::DESCRIPTOR_SET_LAYOUT,
            ObjectType::DescriptorPool => vk::ObjectType::DESCRIPTOR_POOL,
            ObjectType::DescriptorSet => vk::ObjectType::DESCRIPTOR_SET,
            ObjectType::RenderPass => vk::ObjectType::RENDER_PASS,
            ObjectType::Framebuffer => vk::ObjectType::FRAMEBUFFER,
            ObjectType::Fence => vk::ObjectType::FENCE,
            ObjectType::Semaphore => vk::ObjectType::SEMAPHORE,
        }
    }

    /// The API type name, e.g. `VkBuffer`.
    pub fn type_name(self) -> &'static str {
        match self {
            ObjectType::Instance => "VkInstance",
            ObjectType::PhysicalDevice => "VkPhysicalDevice",
            ObjectType::Device => "VkDevice",
            ObjectType::Queue => "VkQueue",
            ObjectType::CommandPool => "VkCommandPool",
            ObjectType::CommandBuffer => "VkCommandBuffer",
            ObjectType::DeviceMemory => "VkDeviceMemory",
            ObjectType::Buffer => "VkBuffer",
            ObjectType::Image => "VkImage",
            ObjectType::ImageView => "VkImageView",
            ObjectType::Sampler => "VkSampler",
            ObjectType::ShaderModule => "VkShaderModule",
            ObjectType::Pipeline => "VkPipeline",
            ObjectType::PipelineLayout => "VkPipelineLayout",
            ObjectType::DescriptorSetLayout => "VkDescriptorSetLayout",
            ObjectType::DescriptorPool => "VkDescriptorPool",
            ObjectType::DescriptorSet => "VkDescriptorSet",
            ObjectType::RenderPass => "VkRenderPass",
            ObjectType::Framebuffer => "VkFramebuffer",
            ObjectType::Fence => "VkFence",
            ObjectType::Semaphore => "VkSemaphore",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
