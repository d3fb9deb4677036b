//! Headless terminal driver.
//!
//! Mints handles, returns success, and records every call it receives so
//! tests can compare what reached the driver with and without validation.
//! Hooks and injected failures let tests steer individual entry points.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use ash::vk;
use dashmap::DashMap;
use parking_lot::Mutex;
use vkguard_api::{DispatchScope, EntryPoint, Handle, VulkanCommand, VulkanResponse};
use vkguard_core::HandleAllocator;

use crate::dispatch::{GetProcAddr, PfnVkCall};

/// First handle value the null driver hands out.
pub const NULL_DRIVER_HANDLE_BASE: u64 = 0x1000;

/// Address returned by `vkMapMemory`.
const MAPPED_ADDRESS_BASE: u64 = 0x7f00_0000_0000;

pub type DriverHook = Arc<dyn Fn(&VulkanCommand) + Send + Sync>;

pub struct NullDriver {
    handles: HandleAllocator,
    calls: Mutex<Vec<VulkanCommand>>,
    hooks: DashMap<EntryPoint, DriverHook>,
    failures: DashMap<EntryPoint, vk::Result>,
    missing: HashSet<EntryPoint>,
    queues: Mutex<HashMap<(Handle, u32, u32), Handle>>,
    physical_devices: Mutex<HashMap<Handle, Handle>>,
    this: Weak<Self>,
}

impl NullDriver {
    pub fn new() -> Arc<Self> {
        Self::without(&[])
    }

    /// A driver that does not export the given entry points.
    pub fn without(missing: &[EntryPoint]) -> Arc<Self> {
        let missing = missing.iter().copied().collect();
        Arc::new_cyclic(|this| Self {
            handles: HandleAllocator::new(NULL_DRIVER_HANDLE_BASE),
            calls: Mutex::new(Vec::new()),
            hooks: DashMap::new(),
            failures: DashMap::new(),
            missing,
            queues: Mutex::new(HashMap::new()),
            physical_devices: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    /// Run `hook` inside the driver whenever `entry` is called, before the
    /// response is produced.
    pub fn set_hook<F>(&self, entry: EntryPoint, hook: F)
    where
        F: Fn(&VulkanCommand) + Send + Sync + 'static,
    {
        self.hooks.insert(entry, Arc::new(hook));
    }

    pub fn clear_hook(&self, entry: EntryPoint) {
        self.hooks.remove(&entry);
    }

    /// Make every later call of `entry` fail with `result`.
    pub fn inject_failure(&self, entry: EntryPoint, result: vk::Result) {
        self.failures.insert(entry, result);
    }

    pub fn clear_failure(&self, entry: EntryPoint) {
        self.failures.remove(&entry);
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<VulkanCommand> {
        self.calls.lock().clone()
    }

    pub fn take_calls(&self) -> Vec<VulkanCommand> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn call_count(&self, entry: EntryPoint) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|cmd| cmd.entry_point() == entry)
            .count()
    }

    pub fn execute(&self, cmd: VulkanCommand) -> VulkanResponse {
        let entry = cmd.entry_point();
        self.calls.lock().push(cmd.clone());

        let hook = self.hooks.get(&entry).map(|h| h.clone());
        if let Some(hook) = hook {
            hook(&cmd);
        }

        if let Some(result) = self.failures.get(&entry).map(|r| *r) {
            tracing::debug!("null driver: injected {:?} for {}", result, entry.name());
            return VulkanResponse::from_result(result);
        }

        self.respond(cmd)
    }

    fn respond(&self, cmd: VulkanCommand) -> VulkanResponse {
        match cmd {
            VulkanCommand::CreateInstance { .. } => VulkanResponse::InstanceCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::EnumeratePhysicalDevices { instance } => {
                let handle = *self
                    .physical_devices
                    .lock()
                    .entry(instance)
                    .or_insert_with(|| self.handles.alloc());
                VulkanResponse::PhysicalDevices {
                    handles: vec![handle],
                }
            }
            VulkanCommand::CreateDevice { .. } => VulkanResponse::DeviceCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::GetDeviceQueue {
                device,
                queue_family_index,
                queue_index,
            } => {
                let handle = *self
                    .queues
                    .lock()
                    .entry((device, queue_family_index, queue_index))
                    .or_insert_with(|| self.handles.alloc());
                VulkanResponse::QueueRetrieved { handle }
            }
            VulkanCommand::DestroyDevice { device } => {
                self.queues.lock().retain(|(d, _, _), _| *d != device);
                VulkanResponse::Success
            }
            VulkanCommand::DestroyInstance { instance } => {
                self.physical_devices.lock().remove(&instance);
                VulkanResponse::Success
            }

            VulkanCommand::AllocateMemory { .. } => VulkanResponse::MemoryAllocated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::MapMemory { offset, .. } => VulkanResponse::MemoryMapped {
                address: MAPPED_ADDRESS_BASE.wrapping_add(offset),
            },
            VulkanCommand::CreateBuffer { .. } => VulkanResponse::BufferCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::CreateImage { .. } => VulkanResponse::ImageCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::CreateImageView { .. } => VulkanResponse::ImageViewCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::CreateSampler { .. } => VulkanResponse::SamplerCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::CreateShaderModule { .. } => VulkanResponse::ShaderModuleCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::CreateDescriptorSetLayout { .. } => {
                VulkanResponse::DescriptorSetLayoutCreated {
                    handle: self.handles.alloc(),
                }
            }
            VulkanCommand::CreatePipelineLayout { .. } => VulkanResponse::PipelineLayoutCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::CreateGraphicsPipelines { create_infos, .. } => {
                VulkanResponse::PipelinesCreated {
                    handles: create_infos.iter().map(|_| self.handles.alloc()).collect(),
                }
            }
            VulkanCommand::CreateComputePipelines { create_infos, .. } => {
                VulkanResponse::PipelinesCreated {
                    handles: create_infos.iter().map(|_| self.handles.alloc()).collect(),
                }
            }
            VulkanCommand::CreateDescriptorPool { .. } => VulkanResponse::DescriptorPoolCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::AllocateDescriptorSets { set_layouts, .. } => {
                VulkanResponse::DescriptorSetsAllocated {
                    handles: set_layouts.iter().map(|_| self.handles.alloc()).collect(),
                }
            }
            VulkanCommand::CreateRenderPass { .. } => VulkanResponse::RenderPassCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::CreateFramebuffer { .. } => VulkanResponse::FramebufferCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::CreateCommandPool { .. } => VulkanResponse::CommandPoolCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::AllocateCommandBuffers { count, .. } => {
                VulkanResponse::CommandBuffersAllocated {
                    handles: (0..count).map(|_| self.handles.alloc()).collect(),
                }
            }
            VulkanCommand::CreateFence { .. } => VulkanResponse::FenceCreated {
                handle: self.handles.alloc(),
            },
            VulkanCommand::CreateSemaphore { .. } => VulkanResponse::SemaphoreCreated {
                handle: self.handles.alloc(),
            },

            // Work completes instantly, so status queries and waits succeed.
            _ => VulkanResponse::Success,
        }
    }
}

impl GetProcAddr for NullDriver {
    fn get_proc_addr(&self, scope: DispatchScope, entry: EntryPoint) -> Option<PfnVkCall> {
        if entry.scope() != scope || self.missing.contains(&entry) {
            return None;
        }
        let this = self.this.upgrade()?;
        Some(Arc::new(move |cmd| this.execute(cmd)))
    }
}
