use crate::{
    load_lines, parse_accuracy, stratified_sample, AblateError, AblationConfig, KernelType, Result,
    SubsetStrategy,
};
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub const SUBSET_SCRIPT: &str = "tools/subset.py";
pub const TRAINING_EXECUTABLE: &str = "svm-train";
pub const PREDICTION_EXECUTABLE: &str = "svm-predict";
pub const SCALING_EXECUTABLE: &str = "svm-scale";

/// Files written by a subsampling step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetFiles {
    /// Held-out records used for prediction
    pub sample: PathBuf,
    /// Every other record, used for training
    pub remainder: PathBuf,
}

/// A trained model on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    pub path: PathBuf,
    /// Feature ranges saved by `svm-scale -s`, applied to data before prediction
    pub scale_ranges: Option<PathBuf>,
}

/// Outcome of a prediction step
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Report text printed by the tool
    pub report: String,
    /// Accuracy percentage parsed from the report
    pub accuracy: f64,
}

/// Subsample, train and predict capabilities of an SVM implementation.
/// All data is exchanged through files so the projector output can be fed
/// straight in.
pub trait SvmToolchain {
    /// Splits `dataset` into a sample of `size` records and the remainder
    fn subset(
        &mut self,
        dataset: &Path,
        size: usize,
        sample: &Path,
        remainder: &Path,
    ) -> Result<SubsetFiles>;

    /// Trains a model on `dataset`, writing it to `model`
    fn train(&mut self, dataset: &Path, model: &Path) -> Result<ModelFile>;

    /// Predicts the records of `sample` with `model`, writing predictions to `predictions`
    fn predict(&mut self, sample: &Path, model: &ModelFile, predictions: &Path)
        -> Result<Prediction>;
}

/// Drives the LIBSVM command-line tools
pub struct LibsvmToolchain {
    root: Option<PathBuf>,
    kernel: KernelType,
    probability: bool,
    cost: f64,
    gamma: Option<f64>,
    scale: bool,
    subset_strategy: SubsetStrategy,
    rng: StdRng,
}

impl LibsvmToolchain {
    pub fn new(config: &AblationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            root: config.toolchain_path.clone(),
            kernel: config.kernel,
            probability: config.probability,
            cost: config.cost,
            gamma: config.gamma,
            scale: config.scale,
            subset_strategy: config.subset_strategy,
            rng,
        }
    }

    /// Location of a toolchain program, relative to the LIBSVM root when one is configured
    pub fn program(&self, relative: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(relative),
            None => PathBuf::from(
                Path::new(relative)
                    .file_name()
                    .unwrap_or(relative.as_ref()),
            ),
        }
    }

    fn probability_flag(&self) -> &'static str {
        if self.probability {
            "1"
        } else {
            "0"
        }
    }

    /// Arguments passed to `svm-train`
    pub fn training_args(&self, dataset: &Path, model: &Path) -> Vec<String> {
        let mut args = vec![
            "-t".to_string(),
            self.kernel.flag().to_string(),
            "-b".to_string(),
            self.probability_flag().to_string(),
            "-c".to_string(),
            self.cost.to_string(),
        ];
        if let Some(gamma) = self.gamma {
            args.push("-g".to_string());
            args.push(gamma.to_string());
        }
        args.push(dataset.display().to_string());
        args.push(model.display().to_string());
        args
    }

    /// Arguments passed to `svm-predict`
    pub fn prediction_args(&self, sample: &Path, model: &Path, predictions: &Path) -> Vec<String> {
        vec![
            "-b".to_string(),
            self.probability_flag().to_string(),
            sample.display().to_string(),
            model.display().to_string(),
            predictions.display().to_string(),
        ]
    }

    /// Arguments passed to `svm-scale`; `-s` saves the ranges of `data`, `-r` restores them
    pub fn scaling_args(&self, mode: ScaleMode, ranges: &Path, data: &Path) -> Vec<String> {
        let flag = match mode {
            ScaleMode::Save => "-s",
            ScaleMode::Restore => "-r",
        };
        vec![
            flag.to_string(),
            ranges.display().to_string(),
            data.display().to_string(),
        ]
    }

    /// Runs `svm-scale` on `data` and writes its stdout to `<data>.scaled`
    fn scale_file(&self, mode: ScaleMode, ranges: &Path, data: &Path) -> Result<PathBuf> {
        let program = self.program(SCALING_EXECUTABLE);
        let args = self.scaling_args(mode, ranges, data);
        let output = run_tool(SCALING_EXECUTABLE, &program, &args)?;
        if mode == ScaleMode::Save {
            ensure_output(SCALING_EXECUTABLE, ranges)?;
        }
        if output.stdout.is_empty() {
            return Err(AblateError::ExternalTool {
                tool: SCALING_EXECUTABLE.to_string(),
                status: output.status.to_string(),
                stderr: format!("no scaled data produced for {}", data.display()),
            });
        }

        let scaled = with_suffix(data, ".scaled");
        fs::write(&scaled, &output.stdout).map_err(|e| AblateError::io(&scaled, e))?;
        Ok(scaled)
    }

    fn subset_in_process(
        &mut self,
        dataset: &Path,
        size: usize,
        sample: &Path,
        remainder: &Path,
    ) -> Result<()> {
        let lines = load_lines(dataset)?;
        let mask = stratified_sample(&lines, size, &mut self.rng)?;

        let mut sample_writer =
            BufWriter::new(File::create(sample).map_err(|e| AblateError::io(sample, e))?);
        let mut remainder_writer =
            BufWriter::new(File::create(remainder).map_err(|e| AblateError::io(remainder, e))?);

        for (line, in_sample) in lines.iter().zip(mask) {
            let (writer, path) = if in_sample {
                (&mut sample_writer, sample)
            } else {
                (&mut remainder_writer, remainder)
            };
            writeln!(writer, "{}", line).map_err(|e| AblateError::io(path, e))?;
        }

        sample_writer
            .flush()
            .map_err(|e| AblateError::io(sample, e))?;
        remainder_writer
            .flush()
            .map_err(|e| AblateError::io(remainder, e))?;
        Ok(())
    }
}

/// Whether `svm-scale` computes feature ranges or applies saved ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    Save,
    Restore,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Runs a program to completion, failing when it cannot start or exits non-zero
fn run_tool(tool: &str, program: &Path, args: &[String]) -> Result<Output> {
    debug!("Executing {} {}", program.display(), args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| AblateError::ExternalTool {
            tool: tool.to_string(),
            status: format!("failed to start {}", program.display()),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(AblateError::ExternalTool {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    Ok(output)
}

/// Fails when a tool exited cleanly but did not write its output file
fn ensure_output(tool: &str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(AblateError::ExternalTool {
            tool: tool.to_string(),
            status: "exit status: 0".to_string(),
            stderr: format!("no output written to {}", path.display()),
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

impl SvmToolchain for LibsvmToolchain {
    fn subset(
        &mut self,
        dataset: &Path,
        size: usize,
        sample: &Path,
        remainder: &Path,
    ) -> Result<SubsetFiles> {
        match self.subset_strategy {
            SubsetStrategy::Script => {
                let program = self.program(SUBSET_SCRIPT);
                let args = vec![
                    dataset.display().to_string(),
                    size.to_string(),
                    sample.display().to_string(),
                    remainder.display().to_string(),
                ];
                run_tool("subset.py", &program, &args)?;
            }
            SubsetStrategy::Stratified => {
                self.subset_in_process(dataset, size, sample, remainder)?;
            }
        }

        ensure_output("subset", sample)?;
        ensure_output("subset", remainder)?;
        Ok(SubsetFiles {
            sample: sample.to_path_buf(),
            remainder: remainder.to_path_buf(),
        })
    }

    fn train(&mut self, dataset: &Path, model: &Path) -> Result<ModelFile> {
        let (dataset, scale_ranges) = if self.scale {
            let ranges = with_suffix(model, ".range");
            (self.scale_file(ScaleMode::Save, &ranges, dataset)?, Some(ranges))
        } else {
            (dataset.to_path_buf(), None)
        };

        let program = self.program(TRAINING_EXECUTABLE);
        let args = self.training_args(&dataset, model);
        run_tool(TRAINING_EXECUTABLE, &program, &args)?;
        ensure_output(TRAINING_EXECUTABLE, model)?;

        Ok(ModelFile {
            path: model.to_path_buf(),
            scale_ranges,
        })
    }

    fn predict(
        &mut self,
        sample: &Path,
        model: &ModelFile,
        predictions: &Path,
    ) -> Result<Prediction> {
        let sample = match &model.scale_ranges {
            Some(ranges) => self.scale_file(ScaleMode::Restore, ranges, sample)?,
            None => sample.to_path_buf(),
        };

        let program = self.program(PREDICTION_EXECUTABLE);
        let args = self.prediction_args(&sample, &model.path, predictions);
        let output = run_tool(PREDICTION_EXECUTABLE, &program, &args)?;
        ensure_output(PREDICTION_EXECUTABLE, predictions)?;

        let report = String::from_utf8_lossy(&output.stdout).into_owned();
        let accuracy = parse_accuracy(&report)?;
        debug!("{}: {}", PREDICTION_EXECUTABLE, report.trim());

        Ok(Prediction {
            report,
            accuracy,
        })
    }
}
