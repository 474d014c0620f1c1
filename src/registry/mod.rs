//! Model profiles and registry.
//!
//! The [`ModelRegistry`] is the single source of truth for every model
//! the gateway can route to. All other components query it; none
//! hard-code model information. The registry is an immutable snapshot:
//! it is populated once at construction (from a TOML catalog or the
//! built-in defaults) and never mutated afterwards, so reads need no
//! synchronization.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{AsahiError, Result};

/// Runtime health of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Degraded,
    Unavailable,
}

impl Default for Availability {
    fn default() -> Self {
        Self::Available
    }
}

/// Metadata for a single LLM model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Canonical model identifier, e.g. `claude-3-5-sonnet`.
    pub name: String,
    /// Provider tag, e.g. `openai`, `anthropic`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Dollar cost per 1000 input tokens.
    pub cost_per_1k_input_tokens: f64,
    /// Dollar cost per 1000 output tokens.
    pub cost_per_1k_output_tokens: f64,
    /// Expected p50 latency in milliseconds.
    pub avg_latency_ms: u64,
    /// Benchmark quality rating in 0.0..5.0.
    pub quality_score: f64,
    /// Maximum context window size.
    pub max_input_tokens: u64,
    /// Maximum generation length.
    pub max_output_tokens: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub availability: Availability,
}

fn default_provider() -> String {
    "openai".to_string()
}

impl ModelProfile {
    /// Average of input and output cost per 1k tokens; the router's
    /// cost axis.
    pub fn avg_cost(&self) -> f64 {
        (self.cost_per_1k_input_tokens + self.cost_per_1k_output_tokens) / 2.0
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AsahiError::Configuration(
                "model name must not be empty".to_string(),
            ));
        }
        if self.cost_per_1k_input_tokens < 0.0 || self.cost_per_1k_output_tokens < 0.0 {
            return Err(AsahiError::Configuration(format!(
                "model '{}': token rates must be >= 0",
                self.name
            )));
        }
        if !(0.0..=5.0).contains(&self.quality_score) {
            return Err(AsahiError::Configuration(format!(
                "model '{}': quality_score {} outside 0.0..5.0",
                self.name, self.quality_score
            )));
        }
        if self.avg_latency_ms == 0 || self.max_input_tokens == 0 || self.max_output_tokens == 0 {
            return Err(AsahiError::Configuration(format!(
                "model '{}': latency and token limits must be > 0",
                self.name
            )));
        }
        Ok(())
    }
}

/// On-disk catalog shape: a `[models.<name>]` table per model.
#[derive(Debug, Deserialize)]
struct Catalog {
    models: HashMap<String, CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(default = "default_provider")]
    provider: String,
    cost_per_1k_input_tokens: f64,
    cost_per_1k_output_tokens: f64,
    avg_latency_ms: u64,
    quality_score: f64,
    max_input_tokens: u64,
    max_output_tokens: u64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    availability: Availability,
}

/// Immutable catalog of model profiles.
#[derive(Debug)]
pub struct ModelRegistry {
    models: HashMap<String, ModelProfile>,
}

impl ModelRegistry {
    /// Build a registry from a list of profiles.
    ///
    /// Duplicate names keep the later profile with a warning. Any
    /// invalid profile fails construction.
    pub fn from_profiles(profiles: Vec<ModelProfile>) -> Result<Self> {
        let mut models = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            profile.validate()?;
            if models.contains_key(&profile.name) {
                warn!(model = %profile.name, "overwriting duplicate model profile");
            }
            models.insert(profile.name.clone(), profile);
        }
        info!(count = models.len(), "model registry built");
        Ok(Self { models })
    }

    /// Parse a TOML catalog document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(raw)
            .map_err(|e| AsahiError::Configuration(format!("invalid model catalog: {e}")))?;
        let profiles = catalog
            .models
            .into_iter()
            .map(|(name, entry)| ModelProfile {
                name,
                provider: entry.provider,
                cost_per_1k_input_tokens: entry.cost_per_1k_input_tokens,
                cost_per_1k_output_tokens: entry.cost_per_1k_output_tokens,
                avg_latency_ms: entry.avg_latency_ms,
                quality_score: entry.quality_score,
                max_input_tokens: entry.max_input_tokens,
                max_output_tokens: entry.max_output_tokens,
                description: entry.description,
                availability: entry.availability,
            })
            .collect();
        Self::from_profiles(profiles)
    }

    /// Load a TOML catalog from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            AsahiError::Configuration(format!("cannot read model catalog {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Registry with the built-in default catalog, used when no catalog
    /// document is supplied.
    pub fn with_defaults() -> Self {
        let profiles = vec![
            ModelProfile {
                name: "gpt-4-turbo".to_string(),
                provider: "openai".to_string(),
                cost_per_1k_input_tokens: 0.010,
                cost_per_1k_output_tokens: 0.030,
                avg_latency_ms: 200,
                quality_score: 4.6,
                max_input_tokens: 128_000,
                max_output_tokens: 4_096,
                description: "Most powerful OpenAI model, highest quality".to_string(),
                availability: Availability::Available,
            },
            ModelProfile {
                name: "claude-opus-4".to_string(),
                provider: "anthropic".to_string(),
                cost_per_1k_input_tokens: 0.015,
                cost_per_1k_output_tokens: 0.075,
                avg_latency_ms: 180,
                quality_score: 4.5,
                max_input_tokens: 200_000,
                max_output_tokens: 4_096,
                description: "High quality Anthropic model, moderate cost".to_string(),
                availability: Availability::Available,
            },
            ModelProfile {
                name: "claude-3-5-sonnet".to_string(),
                provider: "anthropic".to_string(),
                cost_per_1k_input_tokens: 0.003,
                cost_per_1k_output_tokens: 0.015,
                avg_latency_ms: 150,
                quality_score: 4.1,
                max_input_tokens: 200_000,
                max_output_tokens: 4_096,
                description: "Fast, cheap, reasonable quality".to_string(),
                availability: Availability::Available,
            },
        ];
        // The built-in catalog is known valid.
        match Self::from_profiles(profiles) {
            Ok(registry) => registry,
            Err(_) => Self {
                models: HashMap::new(),
            },
        }
    }

    /// Look up a model profile by name.
    pub fn get(&self, name: &str) -> Result<&ModelProfile> {
        self.models
            .get(name)
            .ok_or_else(|| AsahiError::ModelNotFound(name.to_string()))
    }

    /// All registered profiles, in unspecified order.
    pub fn all(&self) -> Vec<&ModelProfile> {
        self.models.values().collect()
    }

    /// Profiles meeting quality and latency constraints, excluding
    /// unavailable models.
    pub fn filter(&self, min_quality: f64, max_latency_ms: u64) -> Vec<&ModelProfile> {
        self.models
            .values()
            .filter(|p| {
                p.quality_score >= min_quality
                    && p.avg_latency_ms <= max_latency_ms
                    && p.availability != Availability::Unavailable
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }
}

/// Quick token estimate: ~1.3 tokens per whitespace-delimited word.
///
/// Returns 0 for blank text, otherwise at least 1.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.trim().is_empty() {
        return 0;
    }
    let words = text.split_whitespace().count() as f64;
    ((words * 1.3) as u64).max(1)
}

/// Dollar cost for a token count under a model's pricing, rounded to
/// 6 decimal places.
pub fn calculate_cost(model: &ModelProfile, input_tokens: u64, output_tokens: u64) -> f64 {
    let input_cost = (input_tokens as f64 / 1000.0) * model.cost_per_1k_input_tokens;
    let output_cost = (output_tokens as f64 / 1000.0) * model.cost_per_1k_output_tokens;
    round6(input_cost + output_cost)
}

pub(crate) fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
