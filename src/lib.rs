pub mod ablation;
pub mod args;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod parsing;
pub mod projector;
pub mod report;
pub mod sampling;
pub mod test_utils;
pub mod toolchain;

pub use ablation::{
    run_ablation, AblationPlan, AblationReport, ColumnOutcome, ColumnResult, RoundSummary,
};
pub use args::{parse_arguments, parse_arguments_from, CliSettings, ColumnList};
pub use config::{AblationConfig, KernelType, MalformedFieldPolicy, SubsetStrategy};
pub use data::{count_lines, load_lines, max_feature_index};
pub use error::{AblateError, Result};
pub use evaluation::{cross_validate, run_trials, TrialStats};
pub use parsing::{parse_feature_field, parse_record, Field, SparseRecord};
pub use projector::{project, project_file, project_record, ColumnSelection, ProjectionStats};
pub use report::parse_accuracy;
pub use sampling::stratified_sample;
pub use toolchain::{
    LibsvmToolchain, ModelFile, Prediction, ScaleMode, SubsetFiles, SvmToolchain,
};
