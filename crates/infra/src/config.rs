//! Workflow configuration: approval chain shape and transition policy.
//!
//! Loaded from JSON or from `PROCUREFLOW_*` environment variables; anything
//! unset keeps its default (standard chain, lenient, confirm explicitly).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use procureflow_purchasing::{
    ApprovalChain, ApprovalStateMachine, StageDefinition, TransitionPolicy,
};

pub const ENV_APPROVAL_CHAIN: &str = "PROCUREFLOW_APPROVAL_CHAIN";
pub const ENV_STRICT_TRANSITIONS: &str = "PROCUREFLOW_STRICT_TRANSITIONS";
pub const ENV_CONFIRM_ON_FINAL_APPROVAL: &str = "PROCUREFLOW_CONFIRM_ON_FINAL_APPROVAL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse workflow config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },

    #[error("invalid approval chain: {0}")]
    InvalidChain(String),
}

impl ConfigError {
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainPreset {
    /// submitted → gm → level1 → level2
    #[default]
    Standard,
    /// submitted → level1 → level2
    TwoLevel,
}

/// Either a named preset or an explicit stage list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainConfig {
    Preset(ChainPreset),
    Stages(Vec<StageDefinition>),
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig::Preset(ChainPreset::Standard)
    }
}

impl ChainConfig {
    pub fn build(&self) -> Result<ApprovalChain, ConfigError> {
        match self {
            ChainConfig::Preset(ChainPreset::Standard) => Ok(ApprovalChain::standard()),
            ChainConfig::Preset(ChainPreset::TwoLevel) => Ok(ApprovalChain::two_level()),
            ChainConfig::Stages(stages) => ApprovalChain::new(stages.clone())
                .map_err(|e| ConfigError::InvalidChain(e.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub approval_chain: ChainConfig,
    /// Raise `InvalidTransition` instead of skipping out-of-order requests.
    pub strict_transitions: bool,
    /// Approving the final stage also confirms the order, in the same commit.
    pub confirm_on_final_approval: bool,
}

impl WorkflowConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_APPROVAL_CHAIN) {
            config.approval_chain = parse_chain(&raw)?;
        }
        if let Some(raw) = lookup(ENV_STRICT_TRANSITIONS) {
            config.strict_transitions = parse_bool(&raw)
                .ok_or_else(|| ConfigError::invalid_env_var(ENV_STRICT_TRANSITIONS, "expected bool"))?;
        }
        if let Some(raw) = lookup(ENV_CONFIRM_ON_FINAL_APPROVAL) {
            config.confirm_on_final_approval = parse_bool(&raw).ok_or_else(|| {
                ConfigError::invalid_env_var(ENV_CONFIRM_ON_FINAL_APPROVAL, "expected bool")
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.approval_chain.build().map(|_| ())
    }

    pub fn policy(&self) -> TransitionPolicy {
        if self.strict_transitions {
            TransitionPolicy::Strict
        } else {
            TransitionPolicy::Lenient
        }
    }

    pub fn state_machine(&self) -> Result<ApprovalStateMachine, ConfigError> {
        Ok(ApprovalStateMachine::new(
            self.approval_chain.build()?,
            self.policy(),
        ))
    }
}

/// A preset name, or a JSON array of stage definitions.
fn parse_chain(raw: &str) -> Result<ChainConfig, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| {
            ConfigError::invalid_env_var(ENV_APPROVAL_CHAIN, format!("bad stage list: {e}"))
        });
    }
    match trimmed.to_lowercase().replace('-', "_").as_str() {
        "standard" => Ok(ChainConfig::Preset(ChainPreset::Standard)),
        "two_level" => Ok(ChainConfig::Preset(ChainPreset::TwoLevel)),
        other => Err(ConfigError::invalid_env_var(
            ENV_APPROVAL_CHAIN,
            format!("unknown preset '{other}'"),
        )),
    }
}

/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
