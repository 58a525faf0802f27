use std::{
    fs, io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::utils;

pub const API_URL_ENV: &str = "EVENT_CATALOG_API_URL";

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_PAGE_SIZE: usize = 6;
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_UPCOMING_COUNT: usize = 6;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub page_size: usize,
    pub debounce_ms: u64,
    pub upcoming_count: usize,
    pub request_timeout_secs: u64,
    pub auth_token: Option<String>,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    /// Event the user tried to join while signed out.
    pub pending_registration: Option<i64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            upcoming_count: DEFAULT_UPCOMING_COUNT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            auth_token: None,
            user_id: None,
            user_name: None,
            pending_registration: None,
        }
    }
}

impl AppConfig {
    /// Base URL, with the environment taking precedence over the file.
    pub fn effective_api_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.api_base_url.clone())
    }

    pub fn page_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.page_size)
            .or(NonZeroUsize::new(DEFAULT_PAGE_SIZE))
            .unwrap_or(NonZeroUsize::MIN)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn clear_session(&mut self) {
        self.auth_token = None;
        self.user_id = None;
        self.user_name = None;
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::open(utils::config_path())
    }

    /// Opens the store at `path`. A missing or unreadable file yields the
    /// defaults; the file is only written on the next update.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = read_config(&path).unwrap_or_else(|err| {
            warn!("ignoring unreadable config {:?}: {err}", path);
            AppConfig::default()
        });
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> AppConfig {
        self.lock().clone()
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self.lock();
        let mut next = guard.clone();
        transform(&mut next);
        write_config(&self.path, &next)?;
        *guard = next;
        Ok(guard.clone())
    }

    fn lock(&self) -> MutexGuard<'_, AppConfig> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}
