use std::path::PathBuf;

use vkguard_api::{DispatchScope, Handle, ObjectType};

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("next layer does not provide required entry point {name} ({scope:?} scope)")]
    MissingEntryPoint {
        name: &'static str,
        scope: DispatchScope,
    },

    #[error("failed to read settings file {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    SettingsSerialize(#[from] toml::ser::Error),
}

/// Failures of the wrapped-handle map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("{0} is not a live wrapped handle")]
    InvalidHandle(Handle),

    #[error("{0} was already released")]
    DoubleDestroy(Handle),
}

/// Failures of an object lifetime lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifetimeError {
    #[error("{handle} was never created")]
    Unknown { handle: Handle },

    #[error("{object_type} {handle} was used after it was destroyed")]
    UseAfterFree {
        handle: Handle,
        object_type: ObjectType,
    },

    #[error("{object_type} {handle} was destroyed twice")]
    DoubleDestroy {
        handle: Handle,
        object_type: ObjectType,
    },

    #[error("{handle} is a {actual}, expected {expected}")]
    WrongType {
        handle: Handle,
        expected: ObjectType,
        actual: ObjectType,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReflectError {
    #[error("shader code is not a whole number of 32-bit words ({0} bytes)")]
    Misaligned(usize),

    #[error("SPIR-V parse failed: {0}")]
    Parse(String),
}
