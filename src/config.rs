//! Persisted sequencer settings
//!
//! Stored as pretty-printed JSON under the platform config dir. Values the
//! vendor protocol needs at call time (enrollment id, illumination color) are
//! exposed through [`SettingsSource`] so callers never hold a stale copy.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::color::IlluminationColor;
use crate::constants::{self, config::*};
use crate::touch_mode::StaleTaskPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// `RRGGBB` hex color of the illumination dot
    #[serde(default = "default_illumination_color")]
    pub illumination_color: String,

    /// Enrollment id sent with the extended fingerprint command
    #[serde(default = "default_enrollment_id")]
    pub enrollment_id: i32,

    /// Whether delayed touch-mode tasks from a superseded activation still fire
    #[serde(default)]
    pub stale_task_policy: StaleTaskPolicy,

    /// Vendor bridge socket (defaults to the runtime dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hal_socket: Option<PathBuf>,
}

fn default_illumination_color() -> String {
    DEFAULT_ILLUMINATION_COLOR.to_string()
}

fn default_enrollment_id() -> i32 {
    DEFAULT_ENROLLMENT_ID
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            illumination_color: default_illumination_color(),
            enrollment_id: default_enrollment_id(),
            stale_task_policy: StaleTaskPolicy::default(),
            hal_socket: None,
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push(FILENAME);
        path
    }

    /// Load from the default location, applying env overrides
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from(&Self::config_path())?;
        settings.apply_overrides(|name| env::var(name).ok());
        settings.validate_and_clamp();
        Ok(settings)
    }

    /// Load from `path`, writing defaults there if the file does not exist yet
    ///
    /// A file that exists but does not parse is an error; it is left untouched
    /// so the user can fix it.
    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let mut settings: Settings = serde_json::from_str(&contents)
                    .context(format!("Failed to parse config file {}", path.display()))?;
                settings.validate_and_clamp();
                debug!(path = %path.display(), "Loaded settings");
                Ok(settings)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let settings = Self::default();
                match settings.save_to(path) {
                    Ok(()) => info!(path = %path.display(), "Generated default config file"),
                    Err(e) => warn!(path = %path.display(), error = ?e, "Failed to write default config"),
                }
                Ok(settings)
            }
            Err(e) => Err(e).context(format!("Failed to read config file {}", path.display())),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        fs::write(path, contents)
            .context(format!("Failed to write config file to {}", path.display()))?;
        Ok(())
    }

    /// Replace out-of-range values with defaults
    pub fn validate_and_clamp(&mut self) {
        if IlluminationColor::parse(&self.illumination_color).is_none() {
            warn!(illumination_color = %self.illumination_color, using = DEFAULT_ILLUMINATION_COLOR, "Invalid illumination_color, using default");
            self.illumination_color = default_illumination_color();
        }

        if self.enrollment_id < 0 {
            warn!(enrollment_id = self.enrollment_id, using = DEFAULT_ENROLLMENT_ID, "Negative enrollment_id, using default");
            self.enrollment_id = default_enrollment_id();
        }
    }

    /// Apply overrides from a variable lookup (the process env in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(color) = lookup(ENV_ILLUMINATION_COLOR) {
            self.illumination_color = color.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_ENROLLMENT_ID) {
            match raw.trim().parse::<i32>() {
                Ok(id) => self.enrollment_id = id,
                Err(e) => warn!(var = ENV_ENROLLMENT_ID, value = %raw, error = %e, "Ignoring unparsable enrollment id override"),
            }
        }
    }

    /// Configured bridge socket, or the runtime-dir default
    pub fn hal_socket_path(&self) -> Result<PathBuf> {
        match &self.hal_socket {
            Some(path) => Ok(path.clone()),
            None => default_socket_path(),
        }
    }
}

/// Get default socket path (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir).join(constants::ipc::SOCKET_RELATIVE_PATH));
    }

    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(constants::ipc::SOCKET_RELATIVE_PATH))
}

/// Configuration values read at the moment they are needed
pub trait SettingsSource: Send + Sync {
    fn illumination_color(&self) -> String;
    fn enrollment_id(&self) -> i32;
}

/// Reads the config file (plus env overrides) on every access
///
/// Edits made while the sequencer runs take effect on the next activation.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> Settings {
        let mut settings = fs::read_to_string(&self.path)
            .context(format!("Failed to read {}", self.path.display()))
            .and_then(|contents| {
                serde_json::from_str::<Settings>(&contents)
                    .context(format!("Failed to parse {}", self.path.display()))
            })
            .unwrap_or_else(|e| {
                warn!(error = ?e, "Settings unavailable, using defaults");
                Settings::default()
            });
        settings.apply_overrides(|name| env::var(name).ok());
        settings.validate_and_clamp();
        settings
    }
}

impl SettingsSource for FileSettings {
    fn illumination_color(&self) -> String {
        self.read().illumination_color
    }

    fn enrollment_id(&self) -> i32 {
        self.read().enrollment_id
    }
}

/// In-memory settings, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticSettings(Mutex<Settings>);

impl StaticSettings {
    pub fn new(settings: Settings) -> Self {
        Self(Mutex::new(settings))
    }

    pub fn update(&self, apply: impl FnOnce(&mut Settings)) {
        apply(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn snapshot(&self) -> Settings {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SettingsSource for StaticSettings {
    fn illumination_color(&self) -> String {
        self.snapshot().illumination_color
    }

    fn enrollment_id(&self) -> i32 {
        self.snapshot().enrollment_id
    }
}
