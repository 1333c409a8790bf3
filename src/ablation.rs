use crate::{
    project_file, run_trials, AblateError, AblationConfig, Result, SvmToolchain, TrialStats,
};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

/// Columns removed up front and the columns to try removing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AblationPlan {
    /// Largest feature index of the dataset, bounding the default candidates
    pub max_index: usize,
    /// Columns excluded from every measurement, including the baseline
    pub initial_removed: BTreeSet<usize>,
    /// Columns to test; every column of the dataset when `None`
    pub candidates: Option<BTreeSet<usize>>,
}

impl AblationPlan {
    /// Plan testing every column `1..=max_index` with nothing removed up front
    pub fn new(max_index: usize) -> Self {
        Self {
            max_index,
            initial_removed: BTreeSet::new(),
            candidates: None,
        }
    }
}

/// What happened when a single column was left out
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOutcome {
    /// Accuracy without the column, and how far it fell below the baseline
    Evaluated { stats: TrialStats, delta: f64 },
    /// Projection or cross-validation failed for this column
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnResult {
    pub column: usize,
    pub outcome: ColumnOutcome,
}

/// One leave-one-out pass over the candidate columns
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    /// 1-based round number
    pub round: usize,
    /// Columns already removed when the round started
    pub removed: BTreeSet<usize>,
    pub baseline: TrialStats,
    pub results: Vec<ColumnResult>,
    /// Column permanently removed before the next round
    pub eliminated: Option<usize>,
}

impl RoundSummary {
    /// Evaluated columns ordered by accuracy drop, most important first
    pub fn ranking(&self) -> Vec<(usize, &TrialStats, f64)> {
        let mut ranked: Vec<(usize, &TrialStats, f64)> = self
            .results
            .iter()
            .filter_map(|result| match &result.outcome {
                ColumnOutcome::Evaluated { stats, delta } => Some((result.column, stats, *delta)),
                ColumnOutcome::Skipped { .. } => None,
            })
            .collect();
        ranked.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));
        ranked
    }

    /// The column whose removal keeps accuracy highest; lowest index wins ties
    pub fn least_important(&self) -> Option<(usize, &TrialStats)> {
        let mut best: Option<(usize, &TrialStats)> = None;
        for result in &self.results {
            if let ColumnOutcome::Evaluated { stats, .. } = &result.outcome {
                match best {
                    Some((_, best_stats)) if stats.mean <= best_stats.mean => {}
                    _ => best = Some((result.column, stats)),
                }
            }
        }
        best
    }

    pub fn skipped(&self) -> impl Iterator<Item = (usize, &str)> {
        self.results.iter().filter_map(|result| match &result.outcome {
            ColumnOutcome::Skipped { reason } => Some((result.column, reason.as_str())),
            ColumnOutcome::Evaluated { .. } => None,
        })
    }
}

/// Results of every round of an ablation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AblationReport {
    pub rounds: Vec<RoundSummary>,
}

impl AblationReport {
    /// Columns eliminated by the greedy rounds, in elimination order
    pub fn eliminated(&self) -> Vec<usize> {
        self.rounds.iter().filter_map(|round| round.eliminated).collect()
    }
}

fn format_columns(columns: &BTreeSet<usize>) -> String {
    if columns.is_empty() {
        "none".to_string()
    } else {
        columns
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for AblationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for summary in &self.rounds {
            writeln!(
                f,
                "\n=== Round {} (removed: {}) ===",
                summary.round,
                format_columns(&summary.removed)
            )?;
            writeln!(
                f,
                "Baseline accuracy: {:.4}% (min {:.4}%, max {:.4}%)",
                summary.baseline.mean, summary.baseline.min, summary.baseline.max
            )?;
            writeln!(
                f,
                "{:>8} {:>10} {:>10} {:>10} {:>10}",
                "column", "mean", "min", "max", "delta"
            )?;
            for (column, stats, delta) in summary.ranking() {
                writeln!(
                    f,
                    "{:>8} {:>10.4} {:>10.4} {:>10.4} {:>+10.4}",
                    column, stats.mean, stats.min, stats.max, delta
                )?;
            }
            for (column, reason) in summary.skipped() {
                writeln!(f, "{:>8} skipped: {}", column, reason)?;
            }
            if let Some(column) = summary.eliminated {
                writeln!(f, "Eliminated column {}", column)?;
            }
        }
        Ok(())
    }
}

/// Projects away `removed` (if anything) and measures the result
fn measure<T: SvmToolchain + ?Sized>(
    toolchain: &mut T,
    dataset: &Path,
    removed: &BTreeSet<usize>,
    config: &AblationConfig,
    work_dir: &Path,
) -> Result<TrialStats> {
    fs::create_dir_all(work_dir).map_err(|e| AblateError::io(work_dir, e))?;

    if removed.is_empty() {
        return run_trials(toolchain, dataset, config, config.trials, work_dir);
    }

    let projected = work_dir.join("dataset.txt");
    project_file(dataset, &projected, removed, config.malformed_policy)?;
    run_trials(toolchain, &projected, config, config.trials, work_dir)
}

/// Deletes a measurement directory unless intermediate files are kept
fn discard(dir: &Path, config: &AblationConfig) {
    if config.keep_intermediate || !dir.exists() {
        return;
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!("Removed {}", dir.display()),
        Err(e) => warn!("Could not remove {}: {}", dir.display(), e),
    }
}

/// Runs the leave-one-out sweep, optionally over several greedy rounds.
///
/// Each round measures a baseline, then measures the dataset once per
/// candidate column with that column removed as well. Failures for a single
/// column are logged and recorded as skipped; a failing baseline aborts the
/// run. Between rounds the least important column is removed permanently and
/// its measurement becomes the next baseline.
///
/// # Arguments
/// * `toolchain` - SVM implementation used for every measurement
/// * `dataset` - Original dataset; never modified
/// * `plan` - Column range, initially removed columns and candidate columns
/// * `config` - Trial count, round count and toolchain settings
/// * `work_dir` - Directory receiving projected datasets and toolchain files;
///   each measurement's files are deleted once it is recorded unless
///   `config.keep_intermediate` is set
pub fn run_ablation<T: SvmToolchain + ?Sized>(
    toolchain: &mut T,
    dataset: &Path,
    plan: &AblationPlan,
    config: &AblationConfig,
    work_dir: &Path,
) -> Result<AblationReport> {
    config.validate()?;
    let max_index = plan.max_index;

    let mut removed = plan.initial_removed.clone();
    let mut carried_baseline: Option<TrialStats> = None;
    let mut report = AblationReport::default();

    for round in 1..=config.rounds {
        let candidates: Vec<usize> = match &plan.candidates {
            Some(columns) => columns
                .iter()
                .copied()
                .filter(|c| !removed.contains(c))
                .collect(),
            None => (1..=max_index).filter(|c| !removed.contains(c)).collect(),
        };
        if candidates.is_empty() {
            info!("No candidate columns left after round {}", round - 1);
            break;
        }

        let round_dir = work_dir.join(format!("round{}", round));
        let baseline = match carried_baseline.take() {
            Some(stats) => stats,
            None => {
                let baseline_dir = round_dir.join("baseline");
                let measured = measure(toolchain, dataset, &removed, config, &baseline_dir);
                discard(&baseline_dir, config);
                measured?
            }
        };
        info!(
            "Round {}: baseline {:.4}% with {} candidate columns",
            round,
            baseline.mean,
            candidates.len()
        );

        let mut results = Vec::with_capacity(candidates.len());
        for column in candidates {
            let mut trial_removed = removed.clone();
            trial_removed.insert(column);
            let column_dir = round_dir.join(format!("column{}", column));

            let measured = measure(toolchain, dataset, &trial_removed, config, &column_dir);
            discard(&column_dir, config);
            let outcome = match measured {
                Ok(stats) => {
                    let delta = baseline.mean - stats.mean;
                    info!(
                        "Without column {}: {:.4}% ({:+.4})",
                        column, stats.mean, -delta
                    );
                    ColumnOutcome::Evaluated { stats, delta }
                }
                Err(e) => {
                    warn!("Skipping column {}: {}", column, e);
                    ColumnOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
            };
            results.push(ColumnResult { column, outcome });
        }
        discard(&round_dir, config);

        let mut summary = RoundSummary {
            round,
            removed: removed.clone(),
            baseline,
            results,
            eliminated: None,
        };

        if round < config.rounds {
            match summary.least_important() {
                Some((column, stats)) => {
                    info!("Eliminating column {} ({:.4}%)", column, stats.mean);
                    carried_baseline = Some(stats.clone());
                    summary.eliminated = Some(column);
                    removed.insert(column);
                }
                None => {
                    warn!("Every column was skipped in round {}, stopping", round);
                    report.rounds.push(summary);
                    break;
                }
            }
        }

        report.rounds.push(summary);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{assert_close, sample_dataset, write_dataset, FakeToolchain};
    use tempfile::tempdir;

    fn weights() -> Vec<(usize, f64)> {
        vec![(1, 2.0), (2, 20.0), (3, 0.0), (4, 8.0)]
    }

    #[test]
    fn test_single_round_ranks_by_accuracy_drop() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 4));
        let mut toolchain = FakeToolchain::new(&weights());

        let report = run_ablation(
            &mut toolchain,
            &dataset,
            &AblationPlan::new(4),
            &AblationConfig::default(),
            &dir.path().join("work"),
        )
        .unwrap();

        assert_eq!(report.rounds.len(), 1);
        let round = &report.rounds[0];
        assert_close(round.baseline.mean, 80.0, 1e-9);
        assert_eq!(round.eliminated, None);

        let ranking: Vec<usize> = round.ranking().iter().map(|r| r.0).collect();
        assert_eq!(ranking, vec![2, 4, 1, 3]);
        assert_close(round.ranking()[0].2, 20.0, 1e-9);
        assert_close(round.ranking()[3].2, 0.0, 1e-9);
        assert_eq!(std::fs::read_to_string(&dataset).unwrap(), sample_dataset(40, 4));
    }

    #[test]
    fn test_greedy_rounds_eliminate_least_important() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 4));
        let mut toolchain = FakeToolchain::new(&weights());
        let config = AblationConfig {
            rounds: 3,
            ..Default::default()
        };

        let report = run_ablation(
            &mut toolchain,
            &dataset,
            &AblationPlan::new(4),
            &config,
            dir.path(),
        )
        .unwrap();

        assert_eq!(report.rounds.len(), 3);
        assert_eq!(report.eliminated(), vec![3, 1]);
        assert_close(report.rounds[1].baseline.mean, 80.0, 1e-9);
        assert_close(report.rounds[2].baseline.mean, 78.0, 1e-9);
        assert_eq!(
            report.rounds[2].removed.iter().copied().collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(report.rounds[2].results.len(), 2);
    }

    #[test]
    fn test_rounds_stop_when_candidates_run_out() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 2));
        let mut toolchain = FakeToolchain::new(&[(1, 5.0), (2, 1.0)]);
        let config = AblationConfig {
            rounds: 5,
            ..Default::default()
        };

        let report = run_ablation(
            &mut toolchain,
            &dataset,
            &AblationPlan::new(2),
            &config,
            dir.path(),
        )
        .unwrap();

        assert_eq!(report.rounds.len(), 2);
        assert_eq!(report.eliminated(), vec![2, 1]);
    }

    #[test]
    fn test_failing_column_is_skipped() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 3));
        let mut toolchain = FakeToolchain::new(&[(1, 1.0), (2, 2.0), (3, 3.0)]).failing_without(2);

        let report = run_ablation(
            &mut toolchain,
            &dataset,
            &AblationPlan::new(3),
            &AblationConfig::default(),
            dir.path(),
        )
        .unwrap();

        let round = &report.rounds[0];
        let skipped: Vec<usize> = round.skipped().map(|(column, _)| column).collect();
        assert_eq!(skipped, vec![2]);
        assert_eq!(round.ranking().len(), 2);
        assert!(report.to_string().contains("skipped"));
    }

    #[test]
    fn test_baseline_failure_aborts() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 3));
        let mut toolchain = FakeToolchain::new(&[]).failing_without(1);
        let plan = AblationPlan {
            initial_removed: [1].into_iter().collect(),
            ..AblationPlan::new(3)
        };

        let err = run_ablation(
            &mut toolchain,
            &dataset,
            &plan,
            &AblationConfig::default(),
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, AblateError::ExternalTool { .. }));
    }

    #[test]
    fn test_explicit_candidates_and_initial_removal() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 4));
        let mut toolchain = FakeToolchain::new(&weights());
        let plan = AblationPlan {
            max_index: 4,
            initial_removed: [2].into_iter().collect(),
            candidates: Some([2, 4].into_iter().collect()),
        };

        let report = run_ablation(
            &mut toolchain,
            &dataset,
            &plan,
            &AblationConfig::default(),
            dir.path(),
        )
        .unwrap();

        let round = &report.rounds[0];
        assert_close(round.baseline.mean, 60.0, 1e-9);
        assert_eq!(round.results.len(), 1);
        assert_eq!(round.results[0].column, 4);
        assert_close(round.ranking()[0].2, 8.0, 1e-9);
    }

    #[test]
    fn test_report_display_lists_columns() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 2));
        let mut toolchain = FakeToolchain::new(&[(1, 5.0), (2, 1.0)]);
        let config = AblationConfig {
            rounds: 2,
            ..Default::default()
        };

        let text = run_ablation(
            &mut toolchain,
            &dataset,
            &AblationPlan::new(2),
            &config,
            dir.path(),
        )
        .unwrap()
        .to_string();

        assert!(text.contains("=== Round 1 (removed: none) ==="));
        assert!(text.contains("Baseline accuracy: 56.0000%"));
        assert!(text.contains("Eliminated column 2"));
        assert!(text.contains("=== Round 2 (removed: 2) ==="));
    }

    #[test]
    fn test_candidates_follow_plan_max_index() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 4));
        let mut toolchain = FakeToolchain::new(&weights());

        let report = run_ablation(
            &mut toolchain,
            &dataset,
            &AblationPlan::new(2),
            &AblationConfig::default(),
            &dir.path().join("work"),
        )
        .unwrap();

        let columns: Vec<usize> = report.rounds[0].results.iter().map(|r| r.column).collect();
        assert_eq!(columns, vec![1, 2]);
        assert_eq!(toolchain.trainings, 3);
    }

    fn column_dirs(work_dir: &Path) -> Vec<String> {
        let mut found = Vec::new();
        let Ok(rounds) = fs::read_dir(work_dir) else {
            return found;
        };
        for round in rounds.map(|entry| entry.unwrap().path()) {
            if !round.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&round).unwrap() {
                let name = entry.unwrap().file_name().to_string_lossy().into_owned();
                if name.starts_with("column") || name == "baseline" {
                    found.push(name);
                }
            }
        }
        found
    }

    #[test]
    fn test_measurement_dirs_are_removed() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 6));
        let mut toolchain = FakeToolchain::new(&[(1, 1.0), (2, 2.0), (3, 3.0)]);
        let config = AblationConfig {
            rounds: 3,
            trials: 2,
            ..Default::default()
        };
        let work_dir = dir.path().join("work");

        let report = run_ablation(
            &mut toolchain,
            &dataset,
            &AblationPlan::new(6),
            &config,
            &work_dir,
        )
        .unwrap();

        assert_eq!(report.rounds.len(), 3);
        assert!(column_dirs(&work_dir).is_empty());
        assert!(!work_dir.join("round1").exists());
    }

    #[test]
    fn test_measurement_dirs_kept_on_request() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path(), "data.txt", &sample_dataset(40, 3));
        let mut toolchain = FakeToolchain::new(&[(1, 1.0), (2, 2.0), (3, 3.0)]);
        let config = AblationConfig {
            keep_intermediate: true,
            ..Default::default()
        };
        let work_dir = dir.path().join("work");

        run_ablation(
            &mut toolchain,
            &dataset,
            &AblationPlan::new(3),
            &config,
            &work_dir,
        )
        .unwrap();

        let mut kept = column_dirs(&work_dir);
        kept.sort();
        assert_eq!(kept, vec!["baseline", "column1", "column2", "column3"]);
        assert!(work_dir.join("round1/column2/dataset.txt").exists());
    }
}
