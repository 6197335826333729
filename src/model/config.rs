use serde::{Deserialize, Serialize};
use std::path::Path;

use super::backbone::StageChannels;
use crate::{Error, Result};

/// Hyper-parameters of the recurrent classification head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalHeadConfig {
    pub hidden_dim: usize,
    pub num_layers: usize,
    /// Number of times the LSTM is re-applied to the single time step.
    pub repeats: usize,
    /// Dropout between stacked LSTM layers.
    pub lstm_dropout: f32,
    /// Dropout before the classifier.
    pub dropout: f32,
}

impl Default for TemporalHeadConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 1024,
            num_layers: 4,
            repeats: 10,
            lstm_dropout: 0.1,
            dropout: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseNetConfig {
    pub growth_rate: usize,
    pub depth: usize,
    /// Channel compression applied by each transition, in (0, 1].
    pub reduction: f64,
    pub n_classes: usize,
    pub bottleneck: bool,
    /// Side length of the square input images. Three resolutions are
    /// traversed, so the final pool window is `input_size / 4`.
    pub input_size: usize,
    pub head: TemporalHeadConfig,
    pub seed: Option<u64>,
}

impl Default for DenseNetConfig {
    fn default() -> Self {
        Self {
            growth_rate: 12,
            depth: 40,
            reduction: 1.0,
            n_classes: 10,
            bottleneck: false,
            input_size: 32,
            head: TemporalHeadConfig::default(),
            seed: None,
        }
    }
}

impl DenseNetConfig {
    pub fn new(
        growth_rate: usize,
        depth: usize,
        reduction: f64,
        n_classes: usize,
        bottleneck: bool,
    ) -> Self {
        Self {
            growth_rate,
            depth,
            reduction,
            n_classes,
            bottleneck,
            ..Self::default()
        }
    }

    pub fn with_growth_rate(mut self, growth_rate: usize) -> Self {
        self.growth_rate = growth_rate;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_reduction(mut self, reduction: f64) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    pub fn with_bottleneck(mut self, bottleneck: bool) -> Self {
        self.bottleneck = bottleneck;
        self
    }

    pub fn with_input_size(mut self, input_size: usize) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn with_head(mut self, head: TemporalHeadConfig) -> Self {
        self.head = head;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Dense units per group: `(depth - 4) / 3`, halved for bottleneck units.
    pub fn n_dense_blocks(&self) -> usize {
        let blocks = self.depth.saturating_sub(4) / 3;
        if self.bottleneck {
            blocks / 2
        } else {
            blocks
        }
    }

    pub fn final_pool_window(&self) -> usize {
        self.input_size / 4
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.growth_rate == 0 {
            return invalid("growth_rate must be positive".to_string());
        }
        if self.n_classes == 0 {
            return invalid("n_classes must be positive".to_string());
        }
        if !(self.reduction > 0.0 && self.reduction <= 1.0) {
            return invalid(format!("reduction must be in (0, 1], got {}", self.reduction));
        }
        if self.n_dense_blocks() == 0 {
            return invalid(format!(
                "depth {} yields no dense units per group (bottleneck: {})",
                self.depth, self.bottleneck
            ));
        }
        let channels = StageChannels::for_config(self);
        if channels.trans1 == 0 || channels.trans2 == 0 {
            return invalid(format!(
                "reduction {} compresses a transition to zero channels",
                self.reduction
            ));
        }
        if self.input_size == 0 || self.input_size % 4 != 0 {
            return invalid(format!(
                "input_size must be a positive multiple of 4, got {}",
                self.input_size
            ));
        }

        let head = &self.head;
        if head.hidden_dim == 0 || head.num_layers == 0 || head.repeats == 0 {
            return invalid(format!(
                "head hidden_dim ({}), num_layers ({}) and repeats ({}) must be positive",
                head.hidden_dim, head.num_layers, head.repeats
            ));
        }
        for (label, rate) in [("lstm_dropout", head.lstm_dropout), ("dropout", head.dropout)] {
            if !(0.0..1.0).contains(&rate) {
                return invalid(format!("{} must be in [0, 1), got {}", label, rate));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_block_count() {
        assert_eq!(DenseNetConfig::new(12, 40, 1.0, 10, false).n_dense_blocks(), 12);
        assert_eq!(DenseNetConfig::new(12, 100, 0.5, 10, true).n_dense_blocks(), 16);
        assert_eq!(DenseNetConfig::new(12, 41, 1.0, 10, false).n_dense_blocks(), 12);
        assert_eq!(DenseNetConfig::new(12, 9, 1.0, 10, true).n_dense_blocks(), 0);
    }

    #[test]
    fn test_validate_rejects_empty_groups() {
        assert!(DenseNetConfig::new(12, 7, 1.0, 10, false).validate().is_ok());
        assert!(DenseNetConfig::new(12, 6, 1.0, 10, false).validate().is_err());
        assert!(DenseNetConfig::new(12, 9, 1.0, 10, true).validate().is_err());
        assert!(DenseNetConfig::new(12, 10, 1.0, 10, true).validate().is_ok());
    }

    #[test]
    fn test_validate_ranges() {
        let base = DenseNetConfig::default();
        assert!(base.validate().is_ok());
        assert!(base.clone().with_reduction(0.0).validate().is_err());
        assert!(base.clone().with_reduction(1.5).validate().is_err());
        assert!(base.clone().with_growth_rate(0).validate().is_err());
        assert!(base.clone().with_input_size(30).validate().is_err());
        assert!(base.clone().with_reduction(0.005).validate().is_err());

        let head = TemporalHeadConfig {
            repeats: 0,
            ..TemporalHeadConfig::default()
        };
        assert!(base.with_head(head).validate().is_err());
    }

    #[test]
    fn test_json_defaults_fill_missing_fields() {
        let config =
            DenseNetConfig::from_json_str(r#"{"growth_rate": 8, "head": {"hidden_dim": 64}}"#)
                .unwrap();

        assert_eq!(config.growth_rate, 8);
        assert_eq!(config.depth, 40);
        assert_eq!(config.head.hidden_dim, 64);
        assert_eq!(config.head.repeats, 10);
        assert_eq!(config.final_pool_window(), 8);
    }

    #[test]
    fn test_json_round_trip_file() {
        let config = DenseNetConfig::new(4, 13, 0.5, 3, true).with_seed(99);
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), config.to_json().unwrap()).unwrap();

        assert_eq!(DenseNetConfig::from_json_file(file.path()).unwrap(), config);
    }
}
