use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{TodoError, TodoResult};

pub const TOKEN_KEY: &str = "access_token";
pub const THEME_KEY: &str = "theme";

/// Client-side key/value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> TodoResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> TodoResult<()>;
    fn remove(&self, key: &str) -> TodoResult<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> TodoResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> TodoResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> TodoResult<()> {
        (**self).remove(key)
    }
}

/// One file per key under `data_dir`.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened datastore");
        Ok(Self { data_dir })
    }

    fn key_path(&self, key: &str) -> TodoResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !valid {
            return Err(TodoError::Storage(format!("invalid key: {key:?}")));
        }
        Ok(self.data_dir.join(format!("{key}.data")))
    }
}

impl KeyValueStore for DataStore {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> TodoResult<Option<String>> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TodoError::Storage(format!(
                "failed reading {}: {err}",
                path.display()
            ))),
        }
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&self, key: &str, value: &str) -> TodoResult<()> {
        let path = self.key_path(key)?;
        write_atomic(&path, value).map_err(|err| TodoError::Storage(format!("{err:#}")))
    }

    #[tracing::instrument(skip(self))]
    fn remove(&self, key: &str) -> TodoResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %path.display(), "removed key");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TodoError::Storage(format!(
                "failed removing {}: {err}",
                path.display()
            ))),
        }
    }
}

#[tracing::instrument(skip(path, value))]
fn write_atomic(path: &Path, value: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving key atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    writeln!(temp, "{value}")?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> TodoResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.map
            .lock()
            .map_err(|_| TodoError::Storage("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> TodoResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> TodoResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> TodoResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemePreference {
    #[default]
    Light,
    Dark,
}

impl ThemePreference {
    pub fn storage_value(&self) -> &'static str {
        match self {
            ThemePreference::Light => "light",
            ThemePreference::Dark => "dark",
        }
    }
}

impl FromStr for ThemePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(ThemePreference::Light),
            "dark" => Ok(ThemePreference::Dark),
            other => Err(anyhow!("invalid theme: {other} (use dark or light)")),
        }
    }
}

/// Stored theme, falling back to light on anything unreadable.
pub fn load_theme(store: &impl KeyValueStore) -> ThemePreference {
    match store.get(THEME_KEY) {
        Ok(Some(raw)) => raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "ignoring unknown stored theme");
            ThemePreference::default()
        }),
        Ok(None) => ThemePreference::default(),
        Err(err) => {
            warn!(error = %err, "failed reading stored theme");
            ThemePreference::default()
        }
    }
}

pub fn save_theme(store: &impl KeyValueStore, theme: ThemePreference) -> TodoResult<()> {
    store.set(THEME_KEY, theme.storage_value())
}
