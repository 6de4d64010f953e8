//! Data directory resolution and the optional `config.toml` inside it.

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;

use rn_core::{DEFAULT_MAX_GENERATION, DEFAULT_MAX_MEMBERS, PlacementPolicy, PlanType};

use crate::error::{Result, StoreError};
use crate::store::Store;

pub const DATA_DIR_ENV: &str = "RN_DATA_DIR";
pub const DATABASE_FILE: &str = "network.db";
pub const CONFIG_FILE: &str = "config.toml";

fn default_data_dir() -> PathBuf {
    dirs_home().join(".referral-network")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Explicit directory, else `RN_DATA_DIR`, else `~/.referral-network`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(PathBuf::from)
        .or_else(|| {
            env::var(DATA_DIR_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(default_data_dir)
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub network: NetworkSettings,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSettings {
    pub default_plan: PlanType,
    pub max_members: u32,
    pub max_generation: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            default_plan: PlanType::default(),
            max_members: DEFAULT_MAX_MEMBERS,
            max_generation: DEFAULT_MAX_GENERATION,
        }
    }
}

impl Config {
    /// Read `config.toml` from `dir`; a missing file yields the defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content)
                .map_err(|e| StoreError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StoreError::Config(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))?;
        config.policy()?;
        Ok(config)
    }

    pub fn policy(&self) -> Result<PlacementPolicy> {
        let settings = &self.network;
        if settings.max_members == 0 {
            return Err(StoreError::Config("max_members must be at least 1".into()));
        }
        if settings.max_generation == 0 {
            return Err(StoreError::Config(
                "max_generation must be at least 1".into(),
            ));
        }
        Ok(PlacementPolicy {
            default_plan: settings.default_plan,
            max_members: settings.max_members,
            max_generation: settings.max_generation,
        })
    }
}

/// Create `dir` if needed, load its config and open `network.db` with the
/// resulting placement policy.
pub fn open_data_dir(dir: &Path) -> Result<Store> {
    fs::create_dir_all(dir).map_err(|e| {
        StoreError::Config(format!("failed to create {}: {e}", dir.display()))
    })?;
    let policy = Config::load(dir)?.policy()?;
    let store = Store::open(&dir.join(DATABASE_FILE))?.with_policy(policy);
    tracing::debug!("opened data directory {}", dir.display());
    Ok(store)
}
