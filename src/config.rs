use crate::SamplingError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

fn default_percentage() -> f64 {
    0.05
}
fn default_min_count() -> usize {
    100
}
fn default_max_count() -> usize {
    150
}
fn default_chunk_rows() -> usize {
    5000
}

/// Sampling parameters. All fields are optional in the JSON form and fall back
/// to the defaults the audit methodology prescribes.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplingParams {
    /// Fraction of unique declarations to target, in (0, 1].
    #[serde(default = "default_percentage")]
    pub percentage: f64,
    #[serde(default = "default_min_count")]
    pub min_count: usize,
    #[serde(default = "default_max_count")]
    pub max_count: usize,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Keep previously selected declarations across repeated runs instead of
    /// resetting. Off by default.
    #[serde(default)]
    pub accumulate: bool,
    /// Detail sheets are split once they exceed this many rows.
    #[serde(default = "default_chunk_rows")]
    pub detail_chunk_rows: usize,
}

impl Default for SamplingParams {
    fn default() -> Self {
        SamplingParams {
            percentage: default_percentage(),
            min_count: default_min_count(),
            max_count: default_max_count(),
            seed: None,
            accumulate: false,
            detail_chunk_rows: default_chunk_rows(),
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<(), SamplingError> {
        if !(self.percentage > 0.0 && self.percentage <= 1.0) {
            return Err(SamplingError::InvalidParameter(format!(
                "percentage must be in (0, 1], got {}",
                self.percentage
            )));
        }
        if self.min_count > self.max_count {
            return Err(SamplingError::InvalidParameter(format!(
                "min_count ({}) exceeds max_count ({})",
                self.min_count, self.max_count
            )));
        }
        if self.detail_chunk_rows == 0 {
            return Err(SamplingError::InvalidParameter(
                "detail_chunk_rows must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Target sample size for a pool of `total` unique declarations:
    /// `clamp(round(total * percentage), min, max)`.
    pub fn target_for(&self, total: usize) -> usize {
        let raw = (total as f64 * self.percentage).round() as usize;
        raw.clamp(self.min_count, self.max_count)
    }
}

pub fn load_params(path: &Path) -> Result<SamplingParams> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read parameter file: {}", path.display()))?;
    let params: SamplingParams =
        serde_json::from_str(&text).context("failed to parse parameter JSON")?;
    params.validate()?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_rounded_then_clamped() {
        let p = SamplingParams::default();
        assert_eq!(p.target_for(1000), 100); // 50 clamped up to min
        assert_eq!(p.target_for(2400), 120);
        assert_eq!(p.target_for(10_000), 150); // clamped down to max
    }

    #[test]
    fn validation_rejects_bad_ranges() {
        let mut p = SamplingParams::default();
        p.percentage = 0.0;
        assert!(p.validate().is_err());
        p.percentage = 0.05;
        p.min_count = 200;
        p.max_count = 100;
        assert!(p.validate().is_err());
    }

    #[test]
    fn json_defaults_apply() {
        let p: SamplingParams = serde_json::from_str(r#"{"seed": 42}"#).unwrap();
        assert_eq!(p.percentage, 0.05);
        assert_eq!(p.seed, Some(42));
        assert!(!p.accumulate);
        assert_eq!(p.detail_chunk_rows, 5000);
    }
}
