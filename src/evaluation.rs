use crate::{count_lines, AblateError, AblationConfig, Result, SvmToolchain};
use log::{debug, info};
use std::fs;
use std::path::Path;

/// Accuracy statistics over repeated cross-validation runs
#[derive(Debug, Clone, PartialEq)]
pub struct TrialStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Accuracy of every run, in run order
    pub accuracies: Vec<f64>,
}

impl TrialStats {
    /// Summarizes a list of accuracies, `None` when the list is empty
    pub fn from_accuracies(accuracies: Vec<f64>) -> Option<Self> {
        if accuracies.is_empty() {
            return None;
        }

        let mean = accuracies.iter().sum::<f64>() / accuracies.len() as f64;
        let min = accuracies.iter().copied().fold(f64::INFINITY, f64::min);
        let max = accuracies.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            mean,
            min,
            max,
            accuracies,
        })
    }
}

/// Runs one cross-validation measurement: hold out a subsample, train on the
/// remainder, predict the subsample and read back the accuracy.
///
/// # Arguments
/// * `toolchain` - SVM implementation used for every step
/// * `dataset` - Dataset to measure
/// * `config` - Supplies the subsample fraction
/// * `work_dir` - Directory receiving the intermediate files
///
/// # Returns
/// Accuracy percentage reported by the prediction step
pub fn cross_validate<T: SvmToolchain + ?Sized>(
    toolchain: &mut T,
    dataset: &Path,
    config: &AblationConfig,
    work_dir: &Path,
) -> Result<f64> {
    fs::create_dir_all(work_dir).map_err(|e| AblateError::io(work_dir, e))?;

    let total_lines = count_lines(dataset)?;
    let size = config.subsample_size(total_lines)?;
    debug!(
        "Holding out {} of {} records from {}",
        size,
        total_lines,
        dataset.display()
    );

    let subset = toolchain.subset(
        dataset,
        size,
        &work_dir.join("subsample.csv"),
        &work_dir.join("remainder.csv"),
    )?;
    let model = toolchain.train(&subset.remainder, &work_dir.join("testcv.model"))?;
    let prediction = toolchain.predict(
        &subset.sample,
        &model,
        &work_dir.join("subsamplecv.output"),
    )?;

    let report_path = work_dir.join("cvoutput.txt");
    fs::write(&report_path, &prediction.report).map_err(|e| AblateError::io(&report_path, e))?;

    info!("Got cv of: {}", prediction.accuracy);
    Ok(prediction.accuracy)
}

/// Repeats `cross_validate` `trials` times, each run in its own subdirectory
pub fn run_trials<T: SvmToolchain + ?Sized>(
    toolchain: &mut T,
    dataset: &Path,
    config: &AblationConfig,
    trials: usize,
    work_dir: &Path,
) -> Result<TrialStats> {
    if trials == 0 {
        return Err(AblateError::Config("at least one trial is required".into()));
    }

    let mut accuracies = Vec::with_capacity(trials);
    for trial in 0..trials {
        let trial_dir = work_dir.join(format!("trial{}", trial + 1));
        accuracies.push(cross_validate(toolchain, dataset, config, &trial_dir)?);
    }

    TrialStats::from_accuracies(accuracies)
        .ok_or_else(|| AblateError::Config("no trials were run".into()))
}
