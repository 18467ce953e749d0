//! Runtime configuration stored as TOML (default `runtime.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::eval::EvalWeights;
use crate::core::safety::Environment;
use crate::core::version::AgentVersion;
use crate::error::RuntimeError;

pub const DEFAULT_CONFIG_PATH: &str = "runtime.toml";

/// Runtime configuration (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Scopes which tools the safety gate allows.
    pub environment: Environment,

    /// Version stamped on the first cycle of a fresh chain.
    pub agent_version: String,

    /// Root of the date-partitioned cycle log.
    pub log_dir: PathBuf,

    pub safety: SafetyConfig,
    pub eval: EvalWeights,
    pub cycle: CycleConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    /// Risky tools below this plan confidence need sandbox rehearsal.
    pub risky_confidence_threshold: f64,

    /// Confidence passed to the gate when assessing a fresh plan.
    pub plan_confidence: f64,

    /// Arguments nested deeper than this are rejected as malformed.
    pub max_argument_depth: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            risky_confidence_threshold: 0.7,
            plan_confidence: 0.8,
            max_argument_depth: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CycleConfig {
    /// Memories retrieved per observation.
    pub memory_k: usize,

    /// Inline characters kept per tool output; the rest is hashed only.
    pub output_max_length: usize,

    /// Overall score a cycle must exceed to bump the patch version.
    pub evolve_threshold: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            memory_k: 8,
            output_max_length: 500,
            evolve_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Days `get_latest_cycle` looks back, counting today. `0` scans every partition.
    pub latest_lookback_days: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            latest_lookback_days: 2,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            agent_version: "1.0.0".to_string(),
            log_dir: PathBuf::from("runs/agi_runtime"),
            safety: SafetyConfig::default(),
            eval: EvalWeights::default(),
            cycle: CycleConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        self.agent_version.parse::<AgentVersion>()?;
        if self.log_dir.as_os_str().is_empty() {
            return Err(invalid("log_dir must not be empty"));
        }
        for (name, value) in [
            (
                "safety.risky_confidence_threshold",
                self.safety.risky_confidence_threshold,
            ),
            ("safety.plan_confidence", self.safety.plan_confidence),
            ("cycle.evolve_threshold", self.cycle.evolve_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(&format!("{name} must be within [0, 1]")));
            }
        }
        if self.safety.max_argument_depth == 0 {
            return Err(invalid("safety.max_argument_depth must be > 0"));
        }
        if self.cycle.output_max_length == 0 {
            return Err(invalid("cycle.output_max_length must be > 0"));
        }
        self.eval.validate()?;
        Ok(())
    }
}

fn invalid(message: &str) -> anyhow::Error {
    RuntimeError::InvalidConfig(message.to_string()).into()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RuntimeConfig::default()`.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        let cfg = RuntimeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RuntimeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RuntimeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
