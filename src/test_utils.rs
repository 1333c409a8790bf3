#[cfg(test)]
use crate::{
    load_lines, parse_accuracy, parse_record, AblateError, Field, MalformedFieldPolicy, ModelFile,
    Prediction, Result, SubsetFiles, SvmToolchain,
};
#[cfg(test)]
use std::collections::{BTreeSet, HashMap};
#[cfg(test)]
use std::path::{Path, PathBuf};

/// Asserts that two floating point values are approximately equal
///
/// # Arguments
/// * `a` - First value
/// * `b` - Second value
/// * `epsilon` - Maximum allowed difference
#[cfg(test)]
pub fn assert_close(a: f64, b: f64, epsilon: f64) {
    assert!((a - b).abs() <= epsilon, "{} != {}", a, b);
}

/// Writes `contents` to `dir/name` and returns the path
#[cfg(test)]
pub fn write_dataset(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Builds a dataset of `records` lines with columns `1..=features`.
/// Every value equals its original column index, so projected files can be
/// traced back to the columns they still contain.
#[cfg(test)]
pub fn sample_dataset(records: usize, features: usize) -> String {
    let mut contents = String::new();
    for i in 0..records {
        contents.push_str(if i % 2 == 0 { "+1" } else { "-1" });
        for column in 1..=features {
            contents.push_str(&format!("\t{}:{}", column, column));
        }
        contents.push('\n');
    }
    contents
}

/// In-memory stand-in for LIBSVM.
///
/// Accuracy is 50 plus the weight of every original column present in the
/// training data, read back from the values written by `sample_dataset`.
#[cfg(test)]
pub struct FakeToolchain {
    weights: HashMap<usize, f64>,
    fail_without: Option<usize>,
    pub trainings: usize,
}

#[cfg(test)]
impl FakeToolchain {
    pub fn new(weights: &[(usize, f64)]) -> Self {
        Self {
            weights: weights.iter().copied().collect(),
            fail_without: None,
            trainings: 0,
        }
    }

    /// Makes training fail whenever `column` is absent from the data
    pub fn failing_without(mut self, column: usize) -> Self {
        self.fail_without = Some(column);
        self
    }

    fn columns_of(path: &Path) -> Result<BTreeSet<usize>> {
        let mut columns = BTreeSet::new();
        for (i, line) in load_lines(path)?.iter().enumerate() {
            let record = parse_record(line, i + 1, MalformedFieldPolicy::Reject)?;
            for field in &record.fields {
                if let Field::Pair { value, .. } = field {
                    columns.insert(value.parse::<usize>().unwrap());
                }
            }
        }
        Ok(columns)
    }
}

#[cfg(test)]
impl SvmToolchain for FakeToolchain {
    fn subset(
        &mut self,
        dataset: &Path,
        size: usize,
        sample: &Path,
        remainder: &Path,
    ) -> Result<SubsetFiles> {
        let lines = load_lines(dataset)?;
        let (head, tail) = lines.split_at(size.min(lines.len()));
        std::fs::write(sample, head.iter().map(|l| format!("{}\n", l)).collect::<String>())
            .map_err(|e| AblateError::io(sample, e))?;
        std::fs::write(remainder, tail.iter().map(|l| format!("{}\n", l)).collect::<String>())
            .map_err(|e| AblateError::io(remainder, e))?;

        Ok(SubsetFiles {
            sample: sample.to_path_buf(),
            remainder: remainder.to_path_buf(),
        })
    }

    fn train(&mut self, dataset: &Path, model: &Path) -> Result<ModelFile> {
        self.trainings += 1;
        let columns = Self::columns_of(dataset)?;

        if let Some(column) = self.fail_without {
            if !columns.contains(&column) {
                return Err(AblateError::ExternalTool {
                    tool: "svm-train".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: format!("column {} missing", column),
                });
            }
        }

        let text: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        std::fs::write(model, text.join(",")).map_err(|e| AblateError::io(model, e))?;
        Ok(ModelFile {
            path: model.to_path_buf(),
            scale_ranges: None,
        })
    }

    fn predict(
        &mut self,
        sample: &Path,
        model: &ModelFile,
        predictions: &Path,
    ) -> Result<Prediction> {
        let text = std::fs::read_to_string(&model.path)
            .map_err(|e| AblateError::io(&model.path, e))?;
        let accuracy = 50.0
            + text
                .split(',')
                .filter(|c| !c.is_empty())
                .map(|c| self.weights.get(&c.parse::<usize>().unwrap()).copied().unwrap_or(0.0))
                .sum::<f64>();

        let lines = load_lines(sample)?;
        std::fs::write(predictions, "1\n".repeat(lines.len()))
            .map_err(|e| AblateError::io(predictions, e))?;

        let report = format!(
            "Accuracy = {:.4}% ({}/{}) (classification)\n",
            accuracy,
            lines.len(),
            lines.len()
        );
        let accuracy = parse_accuracy(&report)?;

        Ok(Prediction {
            report,
            accuracy,
        })
    }
}
