//! Fixed enumeration of intercepted entry points.
//!
//! Dispatch tables are slot arrays indexed by `EntryPoint as usize`.

use serde::{Deserialize, Serialize};

/// Which dispatch table an entry point is resolved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchScope {
    /// Callable before any instance exists (`vkCreateInstance`).
    Global,
    /// Dispatched through an instance or physical device.
    Instance,
    /// Dispatched through a device, queue or command buffer.
    Device,
}

macro_rules! entry_points {
    ($($variant:ident => $name:literal, $scope:ident;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
                 Serialize, Deserialize)]
        #[repr(u16)]
        pub enum EntryPoint {
            $($variant,)*
        }

        impl EntryPoint {
            pub const ALL: &'static [EntryPoint] = &[$(EntryPoint::$variant,)*];

            pub const COUNT: usize = Self::ALL.len();

            /// The API function name, e.g. `vkCreateBuffer`.
            pub fn name(self) -> &'static str {
                match self {
                    $(EntryPoint::$variant => $name,)*
                }
            }

            pub fn scope(self) -> DispatchScope {
                match self {
                    $(EntryPoint::$variant => DispatchScope::$scope,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(EntryPoint::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

entry_points! {
    // ── Instance ────────────────────────────────────────────
    CreateInstance => "vkCreateInstance", Global;
    DestroyInstance => "vkDestroyInstance", Instance;
    EnumeratePhysicalDevices => "vkEnumeratePhysicalDevices", Instance;

    // ── Device ──────────────────────────────────────────────
    CreateDevice => "vkCreateDevice", Instance;
    DestroyDevice => "vkDestroyDevice", Device;
    GetDeviceQueue => "vkGetDeviceQueue", Device;
    DeviceWaitIdle => "vkDeviceWaitIdle", Device;

    // ── Queue ───────────────────────────────────────────────
    QueueSubmit => "vkQueueSubmit", Device;
    QueueWaitIdle => "vkQueueWaitIdle", Device;

    // ── Memory ──────────────────────────────────────────────
    AllocateMemory => "vkAllocateMemory", Device;
    FreeMemory => "vkFreeMemory", Device;
    MapMemory => "vkMapMemory", Device;
    UnmapMemory => "vkUnmapMemory", Device;

    // ── Buffer / Image ──────────────────────────────────────
    CreateBuffer => "vkCreateBuffer", Device;
    DestroyBuffer => "vkDestroyBuffer", Device;
    BindBufferMemory => "vkBindBufferMemory", Device;
    CreateImage => "vkCreateImage", Device;
    DestroyImage => "vkDestroyImage", Device;
    BindImageMemory => "vkBindImageMemory", Device;
    CreateImageView => "vkCreateImageView", Device;
    DestroyImageView => "vkDestroyImageView", Device;
    CreateSampler => "vkCreateSampler", Device;
    DestroySampler => "vkDestroySampler", Device;

    // ── Shaders / Layouts / Pipelines ───────────────────────
    CreateShaderModule => "vkCreateShaderModule", Device;
    DestroyShaderModule => "vkDestroyShaderModule", Device;
    CreateDescriptorSetLayout => "vkCreateDescriptorSetLayout", Device;
    DestroyDescriptorSetLayout => "vkDestroyDescriptorSetLayout", Device;
    CreatePipelineLayout => "vkCreatePipelineLayout", Device;
    DestroyPipelineLayout => "vkDestroyPipelineLayout", Device;
    CreateGraphicsPipelines => "vkCreateGraphicsPipelines", Device;
    CreateComputePipelines => "vkCreateComputePipelines", Device;
    DestroyPipeline => "vkDestroyPipeline", Device;

    // ── Descriptors ─────────────────────────────────────────
    CreateDescriptorPool => "vkCreateDescriptorPool", Device;
    DestroyDescriptorPool => "vkDestroyDescriptorPool", Device;
    ResetDescriptorPool => "vkResetDescriptorPool", Device;
    AllocateDescriptorSets => "vkAllocateDescriptorSets", Device;
    FreeDescriptorSets => "vkFreeDescriptorSets", Device;
    UpdateDescriptorSets => "vkUpdateDescriptorSets", Device;

    // ── Render Pass / Framebuffer ───────────────────────────
    CreateRenderPass => "vkCreateRenderPass", Device;
    DestroyRenderPass => "vkDestroyRenderPass", Device;
    CreateFramebuffer => "vkCreateFramebuffer", Device;
    DestroyFramebuffer => "vkDestroyFramebuffer", Device;

    // ── Command Pool / Buffer ───────────────────────────────
    CreateCommandPool => "vkCreateCommandPool", Device;
    DestroyCommandPool => "vkDestroyCommandPool", Device;
    ResetCommandPool => "vkResetCommandPool", Device;
    AllocateCommandBuffers => "vkAllocateCommandBuffers", Device;
    FreeCommandBuffers => "vkFreeCommandBuffers", Device;
    BeginCommandBuffer => "vkBeginCommandBuffer", Device;
    EndCommandBuffer => "vkEndCommandBuffer", Device;
    ResetCommandBuffer => "vkResetCommandBuffer", Device;

    // ── vkCmd* Recording ────────────────────────────────────
    CmdBindPipeline => "vkCmdBindPipeline", Device;
    CmdBindDescriptorSets => "vkCmdBindDescriptorSets", Device;
    CmdBindVertexBuffers => "vkCmdBindVertexBuffers", Device;
    CmdBindIndexBuffer => "vkCmdBindIndexBuffer", Device;
    CmdSetViewport => "vkCmdSetViewport", Device;
    CmdSetScissor => "vkCmdSetScissor", Device;
    CmdDraw => "vkCmdDraw", Device;
    CmdDrawIndexed => "vkCmdDrawIndexed", Device;
    CmdDispatch => "vkCmdDispatch", Device;
    CmdCopyBuffer => "vkCmdCopyBuffer", Device;
    CmdFillBuffer => "vkCmdFillBuffer", Device;
    CmdUpdateBuffer => "vkCmdUpdateBuffer", Device;
    CmdCopyBufferToImage => "vkCmdCopyBufferToImage", Device;
    CmdPipelineBarrier => "vkCmdPipelineBarrier", Device;
    CmdBeginRenderPass => "vkCmdBeginRenderPass", Device;
    CmdNextSubpass => "vkCmdNextSubpass", Device;
    CmdEndRenderPass => "vkCmdEndRenderPass", Device;
    CmdExecuteCommands => "vkCmdExecuteCommands", Device;

    // ── Fence / Semaphore ───────────────────────────────────
    CreateFence => "vkCreateFence", Device;
    DestroyFence => "vkDestroyFence", Device;
    ResetFences => "vkResetFences", Device;
    GetFenceStatus => "vkGetFenceStatus", Device;
    WaitForFences => "vkWaitForFences", Device;
    CreateSemaphore => "vkCreateSemaphore", Device;
    DestroySemaphore => "vkDestroySemaphore", Device;
}

impl EntryPoint {
    /// Slot index in a dispatch table.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Every entry point here is core 1.0, so a next layer that cannot
    /// provide one is broken.
    pub fn is_required(self) -> bool {
        true
    }

    /// `vkCmd*` entry points record into a command buffer.
    pub fn is_recording(self) -> bool {
        self.name().starts_with("vkCmd")
    }

    /// Entry points of the given scope, in slot order.
    pub fn in_scope(scope: DispatchScope) -> impl Iterator<Item = EntryPoint> {
        Self::ALL.iter().copied().filter(move |ep| ep.scope() == scope)
    }
}
