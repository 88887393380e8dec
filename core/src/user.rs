use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, warn};

use crate::store::{back_up_damaged, write_atomic};

/// Filesystem-safe identifier derived from a display name.
///
/// Surrounding whitespace is trimmed, every run of whitespace becomes a single `_`, and any
/// character outside `[A-Za-z0-9_-]` is replaced with `_`. Distinct display names can map to
/// the same identifier; they then share one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn from_display_name(name: &str) -> Result<Self> {
        let mut id = String::with_capacity(name.len());
        let mut in_space = false;
        for c in name.trim().chars() {
            if c.is_whitespace() {
                if !in_space {
                    id.push('_');
                }
                in_space = true;
                continue;
            }
            in_space = false;
            if c.is_alphanumeric() || c == '-' || c == '_' {
                id.push(c);
            } else {
                id.push('_');
            }
        }
        if id.is_empty() {
            bail!("User name must contain at least one visible character");
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Known display names, persisted as one JSON array. Append-only and deduplicated
/// case-sensitively.
pub struct UserDirectory {
    path: PathBuf,
}

impl UserDirectory {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_names(&self) -> Result<Vec<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("User directory is corrupt: {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read user directory: {}", self.path.display())),
        }
    }

    /// All registered display names in registration order. A missing or unreadable file
    /// reads as an empty directory.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.read_names().unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "user directory unreadable, treating as empty");
            Vec::new()
        })
    }

    /// Register a display name and return its identifier. Registering an existing name is
    /// a no-op.
    pub fn register(&self, display_name: &str) -> Result<UserId> {
        let display_name = display_name.trim();
        let id = UserId::from_display_name(display_name)?;
        let mut names = match self.read_names() {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "user directory unreadable before write");
                if self.path.exists() {
                    back_up_damaged(&self.path)?;
                }
                Vec::new()
            }
        };

        if names.iter().any(|n| n == display_name) {
            return Ok(id);
        }

        if let Some(other) = names
            .iter()
            .find(|n| UserId::from_display_name(n).is_ok_and(|other_id| other_id == id))
        {
            warn!(
                new = display_name,
                existing = %other,
                user_id = %id,
                "display names collide on the same storage identifier; data will be shared"
            );
        }

        names.push(display_name.to_string());
        let json = serde_json::to_vec_pretty(&names).context("Failed to encode user directory")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write user directory: {}", self.path.display()))?;
        debug!(user_id = %id, "registered user");
        Ok(id)
    }

    /// Display names registered under the given identifier.
    #[must_use]
    pub fn names_for(&self, id: &UserId) -> Vec<String> {
        self.list()
            .into_iter()
            .filter(|n| UserId::from_display_name(n).is_ok_and(|other| &other == id))
            .collect()
    }
}
