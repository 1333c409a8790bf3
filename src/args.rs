use crate::{
    AblationConfig, AblationPlan, ColumnSelection, KernelType, MalformedFieldPolicy,
    SubsetStrategy,
};
use clap::{error::ErrorKind, Parser};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::PathBuf;

/// Greedy leave-one-out feature ablation for LIBSVM classifiers.
/// Ranks feature columns by how much cross-validation accuracy drops without them.
#[derive(Parser, Debug)]
#[command(name = "svm-ablate", version)]
struct Args {
    /// Dataset in tab-separated sparse format (label, then index:value fields)
    #[arg(value_parser = validate_file)]
    dataset: PathBuf,

    /// LIBSVM directory holding svm-train, svm-predict and tools/subset.py
    #[arg(long, env = "LIBSVM_HOME")]
    libsvm: Option<PathBuf>,

    /// SVM kernel type
    #[arg(long, value_enum, default_value_t = KernelType::Rbf)]
    kernel: KernelType,

    /// Cost parameter C
    #[arg(long, default_value_t = 10.0)]
    cost: f64,

    /// Kernel gamma (LIBSVM default when omitted)
    #[arg(long)]
    gamma: Option<f64>,

    /// Scale features with svm-scale, reusing the training ranges for the held-out sample
    #[arg(long)]
    scale: bool,

    /// Train and predict without probability estimates
    #[arg(long)]
    no_probability: bool,

    /// Share of records held out for prediction in each trial
    #[arg(long, default_value_t = 0.05, value_parser = parse_fraction)]
    subsample_fraction: f64,

    /// How the held-out sample is drawn
    #[arg(long, value_enum, default_value_t = SubsetStrategy::Script)]
    subset: SubsetStrategy,

    /// Seed for the stratified in-process sampler
    #[arg(long)]
    seed: Option<u64>,

    /// Cross-validation runs averaged per measurement
    #[arg(long, default_value_t = 1, value_parser = parse_positive)]
    trials: usize,

    /// Greedy elimination rounds
    #[arg(long, default_value_t = 1, value_parser = parse_positive)]
    rounds: usize,

    /// Candidate columns to test, e.g. "1,4,7-9" (default: every column)
    #[arg(long, value_parser = parse_column_list)]
    columns: Option<ColumnList>,

    /// Columns removed before any measurement
    #[arg(long, value_parser = parse_column_list, conflicts_with = "retain")]
    remove: Option<ColumnList>,

    /// Keep only these columns, removing all others before any measurement
    #[arg(long, value_parser = parse_column_list)]
    retain: Option<ColumnList>,

    /// Copy fields lacking an index:value marker instead of rejecting the line
    #[arg(long)]
    allow_malformed: bool,

    /// Directory for intermediate files, kept after the run (default: a temporary directory)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Only write the dataset projected by --remove/--retain to this file
    #[arg(long)]
    project_only: Option<PathBuf>,
}

/// A set of 1-based column indices parsed from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnList(pub BTreeSet<usize>);

/// Settings gathered from the command line
#[derive(Debug)]
pub struct CliSettings {
    pub dataset: PathBuf,
    pub config: AblationConfig,
    /// Initial column selection from --remove or --retain
    pub selection: Option<ColumnSelection>,
    pub candidates: Option<BTreeSet<usize>>,
    pub work_dir: Option<PathBuf>,
    pub project_only: Option<PathBuf>,
}

impl CliSettings {
    /// Builds the ablation plan once the dataset's largest column is known
    pub fn plan(&self, max_index: usize) -> AblationPlan {
        AblationPlan {
            max_index,
            initial_removed: self
                .selection
                .as_ref()
                .map(|selection| selection.removal_set(max_index))
                .unwrap_or_default(),
            candidates: self.candidates.clone(),
        }
    }
}

/// Validates that a path points to an existing file
fn validate_file(path: &str) -> Result<PathBuf, clap::Error> {
    let path = PathBuf::from(path);
    if !path.exists() {
        return Err(clap::Error::raw(
            ErrorKind::InvalidValue,
            format!("File not found: {}", path.display()),
        ));
    }
    if !path.is_file() {
        return Err(clap::Error::raw(
            ErrorKind::InvalidValue,
            format!("Not a file: {}", path.display()),
        ));
    }
    Ok(path)
}

fn parse_fraction(value: &str) -> Result<f64, String> {
    let fraction: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if fraction > 0.0 && fraction < 1.0 {
        Ok(fraction)
    } else {
        Err(format!("{} is not between 0 and 1", fraction))
    }
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a positive integer", value)),
    }
}

/// Parses comma-separated columns and inclusive ranges such as `1,4,7-9`
pub fn parse_column_list(value: &str) -> Result<ColumnList, String> {
    let parse_column = |text: &str| -> Result<usize, String> {
        match text.trim().parse::<usize>() {
            Ok(0) => Err("columns start at 1".to_string()),
            Ok(column) => Ok(column),
            Err(_) => Err(format!("'{}' is not a column index", text.trim())),
        }
    };

    let mut columns = BTreeSet::new();
    for part in value.split(',').filter(|part| !part.trim().is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse_column(start)?, parse_column(end)?);
                if start > end {
                    return Err(format!("range {}-{} is reversed", start, end));
                }
                columns.extend(start..=end);
            }
            None => {
                columns.insert(parse_column(part)?);
            }
        }
    }

    if columns.is_empty() {
        return Err("no columns given".to_string());
    }
    Ok(ColumnList(columns))
}

fn into_settings(args: Args) -> CliSettings {
    let selection = match (args.remove, args.retain) {
        (Some(ColumnList(columns)), _) => Some(ColumnSelection::Remove(columns)),
        (None, Some(ColumnList(columns))) => Some(ColumnSelection::Retain(columns)),
        (None, None) => None,
    };

    CliSettings {
        dataset: args.dataset,
        config: AblationConfig {
            toolchain_path: args.libsvm,
            kernel: args.kernel,
            probability: !args.no_probability,
            cost: args.cost,
            gamma: args.gamma,
            scale: args.scale,
            subsample_fraction: args.subsample_fraction,
            subset_strategy: args.subset,
            seed: args.seed,
            trials: args.trials,
            rounds: args.rounds,
            malformed_policy: if args.allow_malformed {
                MalformedFieldPolicy::PassThrough
            } else {
                MalformedFieldPolicy::Reject
            },
            keep_intermediate: args.work_dir.is_some(),
        },
        selection,
        candidates: args.columns.map(|ColumnList(columns)| columns),
        work_dir: args.work_dir,
        project_only: args.project_only,
    }
}

/// Parses and validates command line arguments
pub fn parse_arguments() -> Result<CliSettings, clap::Error> {
    parse_arguments_from(std::env::args_os())
}

/// Parses and validates arguments from an explicit list, first item being the program name
pub fn parse_arguments_from<I, T>(args: I) -> Result<CliSettings, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Args::try_parse_from(args).map(into_settings)
}
