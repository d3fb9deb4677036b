//! The intercepted API surface: handles, entry points, and the
//! command/response model every layer speaks.

pub mod entry_point;
pub mod handle;
pub mod visit;
pub mod vulkan_commands;

pub use entry_point::{DispatchScope, EntryPoint};
pub use handle::{Handle, ObjectType};
pub use visit::{ArgFlags, HandleArg};
pub use vulkan_commands::{VulkanCommand, VulkanResponse};
