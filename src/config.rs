use crate::{AblateError, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// SVM kernel, mirroring the `-t` option of `svm-train`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KernelType {
    Linear,
    Polynomial,
    Rbf,
    Sigmoid,
}

impl KernelType {
    /// Numeric value passed to `svm-train -t`
    pub fn flag(self) -> u8 {
        match self {
            KernelType::Linear => 0,
            KernelType::Polynomial => 1,
            KernelType::Rbf => 2,
            KernelType::Sigmoid => 3,
        }
    }
}

/// How the cross-validation sample is drawn from the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SubsetStrategy {
    /// Run `tools/subset.py` from the LIBSVM distribution
    Script,
    /// Draw a per-label proportional random sample in-process
    Stratified,
}

/// Treatment of dataset fields that lack the `index:value` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedFieldPolicy {
    /// Fail with a parse error naming the line
    #[default]
    Reject,
    /// Copy the field to the output unchanged
    PassThrough,
}

/// Configuration of the toolchain and the ablation sweep
#[derive(Debug, Clone, PartialEq)]
pub struct AblationConfig {
    /// Directory holding `svm-train`, `svm-predict` and `tools/subset.py`;
    /// `None` resolves them through `PATH`
    pub toolchain_path: Option<PathBuf>,
    pub kernel: KernelType,
    /// Train and predict with probability estimates (`-b 1`)
    pub probability: bool,
    /// Cost parameter `C`
    pub cost: f64,
    /// Kernel gamma, LIBSVM picks `1/num_features` when unset
    pub gamma: Option<f64>,
    /// Scale features with `svm-scale` before training; the sample reuses the training ranges
    pub scale: bool,
    /// Share of the dataset held out for prediction in each trial
    pub subsample_fraction: f64,
    pub subset_strategy: SubsetStrategy,
    /// Seed for the in-process subsampler
    pub seed: Option<u64>,
    /// Number of cross-validation runs averaged per measurement
    pub trials: usize,
    /// Number of greedy elimination rounds
    pub rounds: usize,
    pub malformed_policy: MalformedFieldPolicy,
    /// Leave every projected dataset and toolchain file in the work directory
    pub keep_intermediate: bool,
}

impl Default for AblationConfig {
    fn default() -> Self {
        Self {
            toolchain_path: None,
            kernel: KernelType::Rbf,
            probability: true,
            cost: 10.0,
            gamma: None,
            scale: false,
            subsample_fraction: 0.05,
            subset_strategy: SubsetStrategy::Script,
            seed: None,
            trials: 1,
            rounds: 1,
            malformed_policy: MalformedFieldPolicy::Reject,
            keep_intermediate: false,
        }
    }
}

impl AblationConfig {
    /// Checks value ranges that the toolchain would otherwise reject late
    pub fn validate(&self) -> Result<()> {
        if !(self.subsample_fraction > 0.0 && self.subsample_fraction < 1.0) {
            return Err(AblateError::Config(format!(
                "subsample fraction must be between 0 and 1, got {}",
                self.subsample_fraction
            )));
        }
        if !(self.cost > 0.0) {
            return Err(AblateError::Config(format!(
                "cost must be positive, got {}",
                self.cost
            )));
        }
        if let Some(gamma) = self.gamma {
            if !(gamma > 0.0) {
                return Err(AblateError::Config(format!(
                    "gamma must be positive, got {}",
                    gamma
                )));
            }
        }
        if self.trials == 0 {
            return Err(AblateError::Config("at least one trial is required".into()));
        }
        if self.rounds == 0 {
            return Err(AblateError::Config("at least one round is required".into()));
        }
        Ok(())
    }

    /// Number of records held out for prediction out of `total_lines`
    pub fn subsample_size(&self, total_lines: usize) -> Result<usize> {
        let size = (total_lines as f64 * self.subsample_fraction) as usize;
        if size == 0 {
            return Err(AblateError::Config(format!(
                "a {} subsample of {} lines is empty",
                self.subsample_fraction, total_lines
            )));
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_flags() {
        assert_eq!(KernelType::Linear.flag(), 0);
        assert_eq!(KernelType::Polynomial.flag(), 1);
        assert_eq!(KernelType::Rbf.flag(), 2);
        assert_eq!(KernelType::Sigmoid.flag(), 3);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AblationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kernel, KernelType::Rbf);
        assert!(config.probability);
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let bad_fraction = AblationConfig {
            subsample_fraction: 1.0,
            ..Default::default()
        };
        assert!(bad_fraction.validate().is_err());

        let bad_trials = AblationConfig {
            trials: 0,
            ..Default::default()
        };
        assert!(bad_trials.validate().is_err());

        let bad_gamma = AblationConfig {
            gamma: Some(-1.0),
            ..Default::default()
        };
        assert!(bad_gamma.validate().is_err());
    }

    #[test]
    fn test_subsample_size() {
        let config = AblationConfig::default();
        assert_eq!(config.subsample_size(200).unwrap(), 10);
        assert_eq!(config.subsample_size(39).unwrap(), 1);
        assert!(matches!(
            config.subsample_size(10),
            Err(AblateError::Config(_))
        ));

        let config = AblationConfig {
            subsample_fraction: 0.2,
            ..Default::default()
        };
        assert_eq!(config.subsample_size(200).unwrap(), 40);
    }
}
