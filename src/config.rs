//! Optional TOML configuration.
//!
//! Every key has a default, so an empty file (or no file) is a valid
//! configuration. Unknown keys are errors.

use crate::arg_policy::{ArgPolicy, DEFAULT_MAX_ARGS, DEFAULT_MAX_ARG_LEN};
use crate::dispatch::DispatchConfig;
use crate::env_policy::{inherited_search_path, EnvPolicy};
use crate::error::ConfigError;
use crate::governor::GovernorConfig;
use crate::limits::{ParseLimits, ResourceLimits};
use crate::spawner::OutputMode;
use crate::tail::DEFAULT_POLL_INTERVAL;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub governor: GovernorSection,
    #[serde(default)]
    pub env: EnvSection,
    #[serde(default)]
    pub tail: TailSection,
    /// Per-command argument policies, keyed by command name.
    #[serde(default)]
    pub commands: BTreeMap<String, CommandSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsSection {
    pub max_line_len: usize,
    pub max_path_len: usize,
    pub max_segments: usize,
    pub max_segment_len: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        let d = ParseLimits::default();
        Self {
            max_line_len: d.max_line_len,
            max_path_len: d.max_path_len,
            max_segments: d.max_segments,
            max_segment_len: d.max_segment_len,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GovernorSection {
    pub window_ms: u64,
    pub max_per_window: u32,
    pub max_concurrent: usize,
    pub min_interval_ms: u64,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
    /// `false` sends child output to `/dev/null`.
    pub forward_output: bool,
}

impl Default for GovernorSection {
    fn default() -> Self {
        let d = GovernorConfig::default();
        Self {
            window_ms: d.window.as_millis() as u64,
            max_per_window: d.max_per_window,
            max_concurrent: d.max_concurrent,
            min_interval_ms: d.min_interval.as_millis() as u64,
            timeout_ms: d.limits.timeout.as_millis() as u64,
            max_output_bytes: d.limits.max_output,
            forward_output: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvSection {
    /// `PATH` for children and for resolving command names.
    /// Defaults to the dispatcher's own `PATH`.
    pub search_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TailSection {
    pub poll_interval_ms: u64,
}

impl Default for TailSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Bounded,
    None,
    Positional,
    Choices,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSection {
    #[serde(default)]
    pub policy: PolicyKind,
    pub max_args: Option<usize>,
    pub max_arg_len: Option<usize>,
    #[serde(default)]
    pub choices: Vec<String>,
}

impl CommandSection {
    /// Build the argument policy this section describes.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` if a `choices` policy lists no values.
    pub fn to_policy(&self, name: &str) -> Result<ArgPolicy, ConfigError> {
        let max_args = self.max_args.unwrap_or(DEFAULT_MAX_ARGS);
        let max_arg_len = self.max_arg_len.unwrap_or(DEFAULT_MAX_ARG_LEN);

        Ok(match self.policy {
            PolicyKind::Bounded => ArgPolicy::bounded(max_args, max_arg_len),
            PolicyKind::None => ArgPolicy::NoArgs,
            PolicyKind::Positional => ArgPolicy::positional(max_args, max_arg_len),
            PolicyKind::Choices => {
                if self.choices.is_empty() {
                    return Err(ConfigError::Invalid {
                        key: format!("commands.{name}.choices"),
                        reason: "choices policy needs at least one value".to_string(),
                    });
                }
                ArgPolicy::Choices {
                    values: self.choices.iter().cloned().collect(),
                    max_args,
                }
            }
        })
    }
}

impl Config {
    /// Read and validate a config file.
    ///
    /// # Errors
    ///
    /// `Read` if the file cannot be read, `Parse` on invalid TOML or unknown
    /// keys, `Invalid` on out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero: [(&str, u64); 7] = [
            ("governor.window_ms", self.governor.window_ms),
            ("governor.max_per_window", u64::from(self.governor.max_per_window)),
            ("governor.max_concurrent", self.governor.max_concurrent as u64),
            ("governor.timeout_ms", self.governor.timeout_ms),
            ("tail.poll_interval_ms", self.tail.poll_interval_ms),
            ("limits.max_segments", self.limits.max_segments as u64),
            ("limits.max_segment_len", self.limits.max_segment_len as u64),
        ];
        for (key, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        for (name, section) in &self.commands {
            section.to_policy(name)?;
        }
        Ok(())
    }

    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            max_line_len: self.limits.max_line_len,
            max_path_len: self.limits.max_path_len,
            max_segments: self.limits.max_segments,
            max_segment_len: self.limits.max_segment_len,
        }
    }

    pub fn governor_config(&self) -> GovernorConfig {
        let g = &self.governor;
        GovernorConfig {
            window: Duration::from_millis(g.window_ms),
            max_per_window: g.max_per_window,
            max_concurrent: g.max_concurrent,
            min_interval: Duration::from_millis(g.min_interval_ms),
            limits: ResourceLimits {
                timeout: Duration::from_millis(g.timeout_ms),
                max_output: g.max_output_bytes,
            },
        }
    }

    pub fn env_policy(&self) -> EnvPolicy {
        EnvPolicy::SearchPathOnly(
            self.env
                .search_path
                .clone()
                .unwrap_or_else(inherited_search_path),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.tail.poll_interval_ms)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            parse: self.parse_limits(),
            governor: self.governor_config(),
            env: self.env_policy(),
            output: if self.governor.forward_output {
                OutputMode::Forward
            } else {
                OutputMode::Discard
            },
        }
    }

    /// Policy for a command: its section if present, otherwise the default.
    pub fn policy_for(&self, name: &str) -> Result<ArgPolicy, ConfigError> {
        match self.commands.get(name) {
            Some(section) => section.to_policy(name),
            None => Ok(ArgPolicy::default()),
        }
    }
}
