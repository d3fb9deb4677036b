use std::path::Path;

use serde::{Deserialize, Serialize};
use vkguard_common::platform;

use crate::error::LayerError;
use crate::report::Severity;

/// Top-level layer settings, loaded from vkguard.toml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerSettings {
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub core: CoreSettings,
    #[serde(default)]
    pub report: ReportSettings,
}

/// Which layers take part in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default = "default_true")]
    pub thread_safety: bool,
    #[serde(default = "default_true")]
    pub parameters: bool,
    #[serde(default = "default_true")]
    pub object_lifetimes: bool,
    #[serde(default = "default_true")]
    pub unique_objects: bool,
    #[serde(default = "default_true")]
    pub core: bool,
    /// Shader interface checks at pipeline creation. Requires `core`.
    #[serde(default = "default_true")]
    pub shaders: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSettings {
    #[serde(default)]
    pub hazard_strictness: HazardStrictness,
}

/// How aggressively cross-submission hazards are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HazardStrictness {
    Off,
    /// Accesses racing a pending write on another queue with no semaphore chain.
    #[default]
    CrossQueue,
    /// Also same-queue accesses with no barrier recorded before them.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSettings {
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
    /// Reports per message id before it is muted. 0 = unlimited.
    #[serde(default = "default_duplicate_limit")]
    pub duplicate_message_limit: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            thread_safety: true,
            parameters: true,
            object_lifetimes: true,
            unique_objects: true,
            core: true,
            shaders: true,
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            min_severity: default_min_severity(),
            duplicate_message_limit: default_duplicate_limit(),
        }
    }
}

impl ValidationSettings {
    /// Everything off: the chain forwards straight to the driver.
    pub fn none() -> Self {
        Self {
            thread_safety: false,
            parameters: false,
            object_lifetimes: false,
            unique_objects: false,
            core: false,
            shaders: false,
        }
    }

    /// Turn off the named component. Returns `false` for an unknown name.
    pub fn disable(&mut self, component: &str) -> bool {
        let flag = match component {
            "thread_safety" => &mut self.thread_safety,
            "parameters" => &mut self.parameters,
            "object_lifetimes" => &mut self.object_lifetimes,
            "unique_objects" => &mut self.unique_objects,
            "core" => &mut self.core,
            "shaders" => &mut self.shaders,
            "all" => {
                *self = Self::none();
                return true;
            }
            _ => return false,
        };
        *flag = false;
        true
    }
}

impl LayerSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, LayerError> {
        let content = std::fs::read_to_string(path).map_err(|source| LayerError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, LayerError> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(LayerError::SettingsIo { .. }) => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Settings as the chain sees them at creation: the first settings file
    /// found on the search path, then `VKGUARD_DISABLE`.
    pub fn from_environment() -> Self {
        let mut settings = match platform::find_settings_file() {
            Some(path) => {
                tracing::debug!("loading layer settings from {}", path.display());
                Self::load_or_default(&path)
            }
            None => Self::default(),
        };
        if let Ok(list) = std::env::var(platform::DISABLE_ENV) {
            settings.apply_disable_list(&list);
        }
        settings
    }

    /// Apply a comma separated `VKGUARD_DISABLE` value.
    pub fn apply_disable_list(&mut self, list: &str) {
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if !self.validation.disable(name) {
                tracing::warn!("{}: unknown component '{}'", platform::DISABLE_ENV, name);
            }
        }
    }

    pub fn to_toml(&self) -> Result<String, LayerError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn default_true() -> bool {
    true
}

fn default_min_severity() -> Severity {
    Severity::Warning
}

fn default_duplicate_limit() -> u32 {
    10
}
