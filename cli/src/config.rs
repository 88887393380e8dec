use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

use platelog_core::clock::{DEFAULT_UTC_OFFSET_HOURS, FixedOffsetClock};
use platelog_core::error::ConfigError;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;

pub struct Config {
    pub data_dir: PathBuf,
    pub model: String,
    pub ai_timeout: Duration,
    pub utc_offset_hours: i32,
    gemini_api_key: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("model", &self.model)
            .field("ai_timeout", &self.ai_timeout)
            .field("utc_offset_hours", &self.utc_offset_hours)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Config {
    /// Read configuration from the environment once at startup and create the data directory.
    pub fn load() -> Result<Self> {
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                config.data_dir.display()
            )
        })?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = match var("PLATELOG_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "platelog")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };

        let ai_timeout_secs = match var("PLATELOG_AI_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .with_context(|| {
                    format!("Invalid PLATELOG_AI_TIMEOUT_SECS '{raw}'. Use a positive number of seconds")
                })?,
            None => DEFAULT_AI_TIMEOUT_SECS,
        };

        let utc_offset_hours = match var("PLATELOG_UTC_OFFSET_HOURS") {
            Some(raw) => {
                let hours: i32 = raw
                    .parse()
                    .with_context(|| format!("Invalid PLATELOG_UTC_OFFSET_HOURS '{raw}'"))?;
                if FixedOffsetClock::from_hours(hours).is_none() {
                    bail!("PLATELOG_UTC_OFFSET_HOURS must be between -23 and 23");
                }
                hours
            }
            None => DEFAULT_UTC_OFFSET_HOURS,
        };

        Ok(Config {
            data_dir,
            model: var("PLATELOG_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ai_timeout: Duration::from_secs(ai_timeout_secs),
            utc_offset_hours,
            gemini_api_key: var(API_KEY_VAR),
        })
    }

    /// The AI credential, required by meal analysis and model listing only.
    pub fn gemini_api_key(&self) -> Result<&str, ConfigError> {
        self.gemini_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential { var: API_KEY_VAR })
    }

    pub fn clock(&self) -> FixedOffsetClock {
        FixedOffsetClock::from_hours(self.utc_offset_hours).unwrap_or_default()
    }

    /// Load the HTTP API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }
}
