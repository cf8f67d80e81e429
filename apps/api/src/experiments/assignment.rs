//! Variant Assignment — pure hashing of (identity, experiment) onto a traffic split.
//!
//! percentile = md5(identity ++ experiment_id)[0..4] as u32 % 100
//! The variant list is walked accumulating traffic percentages; the first variant
//! whose cumulative range contains the percentile wins.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExperimentError {
    #[error("Experiment '{0}' has no variants")]
    NoVariants(String),

    #[error("Experiment '{experiment}' declares variant '{variant}' more than once")]
    DuplicateVariant { experiment: String, variant: String },

    #[error("Experiment '{experiment}' traffic sums to {sum}%, expected 100%")]
    TrafficSum { experiment: String, sum: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub traffic_percent: u8,
    #[serde(default)]
    pub config: Value,
}

/// A validated experiment. Only constructible through `Experiment::new`, so
/// every instance satisfies the traffic invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Experiment {
    id: String,
    name: String,
    variants: Vec<Variant>,
}

impl Experiment {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        variants: Vec<Variant>,
    ) -> Result<Self, ExperimentError> {
        let id = id.into();
        if variants.is_empty() {
            return Err(ExperimentError::NoVariants(id));
        }

        let mut names = HashSet::new();
        for variant in &variants {
            if !names.insert(variant.name.as_str()) {
                return Err(ExperimentError::DuplicateVariant {
                    experiment: id,
                    variant: variant.name.clone(),
                });
            }
        }

        let sum: u32 = variants.iter().map(|v| v.traffic_percent as u32).sum();
        if sum != 100 {
            return Err(ExperimentError::TrafficSum { experiment: id, sum });
        }

        Ok(Self {
            id,
            name: name.into(),
            variants,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }
}

/// Audit record of one assignment. Insert-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub user_id: String,
    pub experiment_id: String,
    pub variant: String,
    pub assigned_at: DateTime<Utc>,
}

/// Position of `(user_id, experiment_id)` on the 0..100 traffic line.
pub fn percentile(user_id: &str, experiment_id: &str) -> u32 {
    let digest = md5::compute(format!("{user_id}{experiment_id}").as_bytes());
    let head = [digest.0[0], digest.0[1], digest.0[2], digest.0[3]];
    u32::from_be_bytes(head) % 100
}

/// Deterministically picks the variant for `user_id`.
pub fn assign<'a>(user_id: &str, experiment: &'a Experiment) -> &'a Variant {
    let position = percentile(user_id, &experiment.id);
    let mut cumulative = 0u32;
    for variant in &experiment.variants {
        cumulative += variant.traffic_percent as u32;
        if position < cumulative {
            return variant;
        }
    }
    &experiment.variants[0]
}
