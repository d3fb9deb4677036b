use std::path::PathBuf;

/// Environment variable naming an explicit settings file.
pub const SETTINGS_ENV: &str = "VKGUARD_SETTINGS";

/// Environment variable listing components to disable, comma separated.
pub const DISABLE_ENV: &str = "VKGUARD_DISABLE";

/// Settings file name used for the system-wide and local lookups.
pub const SETTINGS_FILE: &str = "vkguard.toml";

/// Returns the system-wide settings path for this platform.
pub fn system_settings_path() -> PathBuf {
    #[cfg(windows)]
    {
        let programdata = std::env::var("PROGRAMDATA")
            .unwrap_or_else(|_| r"C:\ProgramData".to_string());
        PathBuf::from(programdata).join("vkguard").join(SETTINGS_FILE)
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/etc/vkguard").join(SETTINGS_FILE)
    }
}

/// Returns the settings file to read, in search order:
/// 1. `VKGUARD_SETTINGS`
/// 2. the system-wide path (see [`system_settings_path`])
/// 3. `./vkguard.toml`
///
/// Returns `None` when no candidate exists.
pub fn find_settings_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(SETTINGS_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }
    let system = system_settings_path();
    if system.exists() {
        return Some(system);
    }
    let local = PathBuf::from(SETTINGS_FILE);
    if local.exists() {
        return Some(local);
    }
    None
}

/// Returns the platform name string.
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "windows")]
    { "windows" }
    #[cfg(target_os = "linux")]
    { "linux" }
    #[cfg(target_os = "macos")]
    { "macos" }
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    { "unknown" }
}
