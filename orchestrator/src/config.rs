//! Configuration loading

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::GraphError;

/// Name the router is known by; workers use it to hand control back
pub const DEFAULT_ROUTER_NAME: &str = "supervisor";

/// Keyword a router or worker uses to end the run
pub const DEFAULT_FINISH_KEYWORD: &str = "FINISH";

/// Default bound on worker dispatches per run
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Config file searched for by [`GraphFileConfig::load`]
pub const CONFIG_FILE_NAME: &str = ".graph.toml";

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at ~/.config/market-graph/
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join("market-graph").join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Name the router answers to
    #[serde(default = "default_router_name")]
    pub router_name: String,

    /// Routing keyword that ends the run
    #[serde(default = "default_finish_keyword")]
    pub finish_keyword: String,

    /// Maximum worker dispatches per run (0 = unbounded)
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

fn default_router_name() -> String {
    DEFAULT_ROUTER_NAME.to_string()
}

fn default_finish_keyword() -> String {
    DEFAULT_FINISH_KEYWORD.to_string()
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            router_name: default_router_name(),
            finish_keyword: default_finish_keyword(),
            max_steps: default_max_steps(),
        }
    }
}

impl GraphConfig {
    /// Effective step limit, `None` when unbounded
    pub fn step_limit(&self) -> Option<usize> {
        (self.max_steps > 0).then_some(self.max_steps)
    }

    /// Set the step limit. `None` and `Some(0)` both mean unbounded, matching
    /// `max_steps = 0` in the config file.
    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps.unwrap_or(0);
        self
    }

    pub fn with_router_name(mut self, name: impl Into<String>) -> Self {
        self.router_name = name.into();
        self
    }

    pub fn with_finish_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.finish_keyword = keyword.into();
        self
    }
}

/// Top-level config file (`.graph.toml`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphFileConfig {
    #[serde(default)]
    pub graph: GraphConfig,
}

impl GraphFileConfig {
    /// Load from `.graph.toml`, falling back to defaults when none is found
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for .graph.toml
    /// 2. Check ~/.config/market-graph/.graph.toml (global fallback)
    pub fn load() -> Result<Self, GraphError> {
        if let Some(path) = find_config_file(CONFIG_FILE_NAME) {
            tracing::debug!("Loading graph config from: {}", path.display());
            return Self::load_from_path(&path);
        }

        tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, GraphError> {
        toml::from_str(toml_str).map_err(|e| GraphError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, GraphError> {
        toml::to_string_pretty(self).map_err(|e| GraphError::Config(e.to_string()))
    }
}
