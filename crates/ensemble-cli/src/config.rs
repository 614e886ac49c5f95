//! TOML configuration for the `ensemble` binary.
//!
//! Every section has serde defaults, so an absent file or a partial file
//! yields a working setup: five default workers, template decomposition,
//! and `.ensemble/` storage in the working directory.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ensemble_core::{
    CostClass, InvocationParams, SchedulerPolicy, SynthesisConfig, WorkerRole, WorkerSpec,
};

/// `ENSEMBLE_CONFIG` overrides the default config file location.
pub const CONFIG_ENV: &str = "ENSEMBLE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "ensemble.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub synthesis: SynthesisSection,
    pub decomposer: DecomposerConfig,
    pub workers: Vec<WorkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for project records and ledgers.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".ensemble"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub invoke_timeout_secs: u64,
    pub max_concurrent: usize,
    pub worker_failure_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let policy = SchedulerPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_backoff_ms: policy.base_backoff.as_millis() as u64,
            invoke_timeout_secs: policy.invoke_timeout.as_secs(),
            max_concurrent: policy.max_concurrent,
            worker_failure_threshold: policy.worker_failure_threshold,
        }
    }
}

impl SchedulerConfig {
    pub fn to_policy(&self) -> SchedulerPolicy {
        SchedulerPolicy {
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            invoke_timeout: Duration::from_secs(self.invoke_timeout_secs),
            max_concurrent: self.max_concurrent,
            worker_failure_threshold: self.worker_failure_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSection {
    pub role_priority: Vec<WorkerRole>,
}

impl Default for SynthesisSection {
    fn default() -> Self {
        Self {
            role_priority: WorkerRole::priority_order().to_vec(),
        }
    }
}

impl SynthesisSection {
    pub fn to_config(&self) -> SynthesisConfig {
        SynthesisConfig {
            role_priority: self.role_priority.clone(),
        }
    }
}

/// Which decomposition strategy builds the task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecomposerKind {
    Template,
    Planner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposerConfig {
    pub kind: DecomposerKind,
    /// Template only: add a closing integration task depending on the rest.
    pub integrate: bool,
    /// Planner only: role of the planning worker.
    pub planner_role: WorkerRole,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            kind: DecomposerKind::Template,
            integrate: false,
            planner_role: WorkerRole::General,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub key: String,
    pub name: String,
    pub role: WorkerRole,
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub cost_class: CostClass,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            key: "general".to_string(),
            name: "General".to_string(),
            role: WorkerRole::General,
            model: "default".to_string(),
            temperature: 0.7,
            system_prompt: "You are the {role} member of a collaborative team.".to_string(),
            cost_class: CostClass::Standard,
        }
    }
}

impl WorkerConfig {
    pub fn to_spec(&self) -> WorkerSpec {
        WorkerSpec::new(&self.key, &self.name, self.role)
            .with_params(InvocationParams {
                model: self.model.clone(),
                temperature: self.temperature,
                system_prompt: self.system_prompt.clone(),
            })
            .with_cost_class(self.cost_class)
    }
}

impl Config {
    /// Workers to register: the configured set, or one worker per role.
    pub fn effective_workers(&self) -> Vec<WorkerConfig> {
        if !self.workers.is_empty() {
            return self.workers.clone();
        }
        WorkerRole::priority_order()
            .into_iter()
            .map(|role| WorkerConfig {
                key: role.to_string(),
                name: role.label().to_string(),
                role,
                ..Default::default()
            })
            .collect()
    }
}

/// Resolve the config file path: explicit flag, then `ENSEMBLE_CONFIG`,
/// then `ensemble.toml` in the working directory.
pub fn config_file(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Load the config, falling back to defaults when the file is absent.
pub fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let path = config_file(explicit);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

/// Write the default config to `path`, refusing to clobber an existing file.
pub fn write_default_config(path: &PathBuf) -> Result<()> {
    anyhow::ensure!(
        !path.exists(),
        "config file already exists: {}",
        path.display()
    );
    let mut config = Config::default();
    config.workers = config.effective_workers();
    let rendered = toml::to_string_pretty(&config).context("failed to render default config")?;
    fs::write(path, rendered)
        .with_context(|| format!("failed to write config file: {}", path.display()))?;
    Ok(())
}
