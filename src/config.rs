//! Configuration
//!
//! Tuning for the plan compiler and executor plus the external verb and
//! attribute registries, all loaded from YAML files in a config directory:
//!
//! ```text
//! config/
//! ├── onboarding.yaml   # compiler + executor tuning (optional, defaults apply)
//! ├── verbs.yaml        # allowed verbs by domain
//! └── attributes.yaml   # attribute id → owning domain
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::compiler::registry::{AttributeRegistry, VerbRegistry};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "OB_CONFIG_DIR";

// ============================================================================
// Config types
// ============================================================================

/// Top-level `onboarding.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingConfig {
    pub compiler: CompilerConfig,
    pub executor: ExecutorConfig,
}

/// Plan compiler tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Within-phase priority by domain (higher runs first)
    pub domain_priorities: BTreeMap<String, u32>,
    /// Priority of domains not listed above
    pub default_priority: u32,
    /// Estimated duration of one operation by domain (plan metadata only)
    pub estimated_duration_ms: BTreeMap<String, u64>,
    pub default_duration_ms: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            domain_priorities: BTreeMap::from([
                ("kyc".to_string(), 100),
                ("ubo".to_string(), 90),
                ("resources".to_string(), 80),
            ]),
            default_priority: 50,
            estimated_duration_ms: BTreeMap::new(),
            default_duration_ms: 1_000,
        }
    }
}

impl CompilerConfig {
    pub fn priority_for(&self, domain: &str) -> u32 {
        self.domain_priorities
            .get(domain)
            .copied()
            .unwrap_or(self.default_priority)
    }

    pub fn duration_for(&self, domain: &str) -> u64 {
        self.estimated_duration_ms
            .get(domain)
            .copied()
            .unwrap_or(self.default_duration_ms)
    }
}

/// What the executor does when a phase exceeds its timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnTimeout {
    /// Abort the plan
    #[default]
    Fail,
    /// Abandon the unfinished operations and advance
    Continue,
    /// Re-run the phase up to `max_retries` times, then fail
    Retry,
}

/// Downstream executor settings; also stamped into plan sync points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Worker bound, independent of phase width
    pub max_concurrency: usize,
    pub phase_timeout_ms: u64,
    pub on_timeout: OnTimeout,
    pub max_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            phase_timeout_ms: 300_000,
            on_timeout: OnTimeout::Fail,
            max_retries: 2,
        }
    }
}

impl OnboardingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.executor.max_concurrency == 0 {
            bail!("executor.max_concurrency must be at least 1");
        }
        if self.executor.phase_timeout_ms == 0 {
            bail!("executor.phase_timeout_ms must be positive");
        }
        Ok(())
    }
}

// ============================================================================
// Loader
// ============================================================================

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Create loader from OB_CONFIG_DIR or fall back to a `config` directory
    ///
    /// Path resolution order:
    /// 1. OB_CONFIG_DIR environment variable (explicit override)
    /// 2. Relative "config" path (works when running from the workspace root)
    /// 3. Compile-time CARGO_MANIFEST_DIR/config (works for test binaries)
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Self::new(dir);
        }

        if Path::new("config").join("verbs.yaml").exists() {
            return Self::new("config");
        }

        Self::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn read(&self, file: &str) -> Result<String> {
        let path = self.config_dir.join(file);
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Load `onboarding.yaml`; a missing file yields the defaults
    pub fn load_config(&self) -> Result<OnboardingConfig> {
        let path = self.config_dir.join("onboarding.yaml");
        if !path.exists() {
            info!("No {} found, using default configuration", path.display());
            return Ok(OnboardingConfig::default());
        }

        let content = self.read("onboarding.yaml")?;
        let config: OnboardingConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the verb registry from `verbs.yaml`
    pub fn load_verbs(&self) -> Result<VerbRegistry> {
        let content = self.read("verbs.yaml")?;
        let registry = VerbRegistry::from_yaml_str(&content).context("Failed to parse verbs.yaml")?;
        info!(
            "Loaded {} verbs across {} domains",
            registry.len(),
            registry.domains().len()
        );
        Ok(registry)
    }

    /// Load the attribute registry from `attributes.yaml`
    pub fn load_attributes(&self) -> Result<AttributeRegistry> {
        let content = self.read("attributes.yaml")?;
        let registry =
            AttributeRegistry::from_yaml_str(&content).context("Failed to parse attributes.yaml")?;
        info!("Loaded {} attributes", registry.len());
        Ok(registry)
    }
}
