use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine configuration. Every field is optional on the wire; missing values
/// fall back to the defaults below. The same shape is accepted as TOML (CLI)
/// and as the `options` object of the host payload (JSON).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupeConfig {
    pub thresholds: Thresholds,
    pub final_score_weights: FinalScoreWeights,
    pub rules: RuleToggles,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    /// Minimum pairwise score for a candidate pair to become an edge.
    pub min_pair: f64,
    /// Minimum intra-pair score the splitter keeps as a local edge.
    pub min_internal: f64,
    /// Buckets larger than this are scored in contiguous chunks of this size.
    pub block_chunk_size: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_pair: 0.62,
            min_internal: 0.50,
            block_chunk_size: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinalScoreWeights {
    pub first_name_score: f64,
    pub family_name_score: f64,
    pub advanced_name_score: f64,
    pub token_reorder_score: f64,
    pub husband_score: f64,
    pub id_score: f64,
    pub phone_score: f64,
    pub children_score: f64,
    pub location_score: f64,
}

impl Default for FinalScoreWeights {
    fn default() -> Self {
        Self {
            first_name_score: 0.15,
            family_name_score: 0.25,
            advanced_name_score: 0.12,
            token_reorder_score: 0.10,
            husband_score: 0.12,
            id_score: 0.08,
            phone_score: 0.05,
            children_score: 0.06,
            location_score: 0.04,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleToggles {
    pub enable_polygamy_rules: bool,
}

impl Default for RuleToggles {
    fn default() -> Self {
        Self {
            enable_polygamy_rules: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl DedupeConfig {
    pub fn from_toml(input: &str) -> Result<Self, EngineError> {
        let config: DedupeConfig =
            toml::from_str(input).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let t = &self.thresholds;
        for (name, value) in [("minPair", t.min_pair), ("minInternal", t.min_internal)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::ConfigValidation(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if t.block_chunk_size == 0 {
            return Err(EngineError::ConfigValidation(
                "blockChunkSize must be positive".into(),
            ));
        }

        let w = &self.final_score_weights;
        let weights = [
            ("firstNameScore", w.first_name_score),
            ("familyNameScore", w.family_name_score),
            ("advancedNameScore", w.advanced_name_score),
            ("tokenReorderScore", w.token_reorder_score),
            ("husbandScore", w.husband_score),
            ("idScore", w.id_score),
            ("phoneScore", w.phone_score),
            ("childrenScore", w.children_score),
            ("locationScore", w.location_score),
        ];
        for (name, value) in weights {
            if value < 0.0 || !value.is_finite() {
                return Err(EngineError::ConfigValidation(format!(
                    "weight {name} must be a non-negative number, got {value}"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
