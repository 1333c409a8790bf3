use crate::{parse_record, AblateError, Field, MalformedFieldPolicy, Result, SparseRecord};
use log::debug;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Columns to project away, in the original index space of the dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelection {
    /// Drop exactly these columns
    Remove(BTreeSet<usize>),
    /// Keep only these columns, dropping every other index up to the dataset maximum
    Retain(BTreeSet<usize>),
}

impl ColumnSelection {
    /// Resolves the selection to a removal set
    ///
    /// # Arguments
    /// * `max_index` - Largest feature index of the dataset, bounding the retain universe
    pub fn removal_set(&self, max_index: usize) -> BTreeSet<usize> {
        match self {
            ColumnSelection::Remove(columns) => columns.clone(),
            ColumnSelection::Retain(columns) => (1..=max_index)
                .filter(|index| !columns.contains(index))
                .collect(),
        }
    }
}

/// Counts gathered while projecting a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    pub records: usize,
    pub pairs_kept: usize,
    pub pairs_dropped: usize,
}

/// Appends the projection of one record to `out`, including the newline.
/// Kept pairs are renumbered 1..k within the record.
pub fn project_record(
    record: &SparseRecord,
    removed: &BTreeSet<usize>,
    out: &mut String,
    stats: &mut ProjectionStats,
) {
    out.push_str(record.label);
    out.push('\t');

    let mut next_index = 1;
    let mut first = true;
    for field in &record.fields {
        let text = match *field {
            Field::Pair { index, .. } if removed.contains(&index) => {
                stats.pairs_dropped += 1;
                continue;
            }
            Field::Pair { value, .. } => {
                let text = format!("{}:{}", next_index, value);
                next_index += 1;
                stats.pairs_kept += 1;
                text
            }
            Field::Malformed(raw) => raw.to_string(),
        };
        if !first {
            out.push('\t');
        }
        out.push_str(&text);
        first = false;
    }

    out.push('\n');
    stats.records += 1;
}

fn project_lines<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    removed: &BTreeSet<usize>,
    policy: MalformedFieldPolicy,
    input: &Path,
    output: &Path,
) -> Result<ProjectionStats> {
    let mut stats = ProjectionStats::default();
    let mut out = String::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AblateError::io(input, e))?;
        let record = parse_record(&line, i + 1, policy).map_err(|e| e.with_path(input))?;

        out.clear();
        project_record(&record, removed, &mut out, &mut stats);
        writer
            .write_all(out.as_bytes())
            .map_err(|e| AblateError::io(output, e))?;
    }

    Ok(stats)
}

/// Projects a dataset stream, writing one record per input record
///
/// # Arguments
/// * `reader` - Source of sparse records
/// * `writer` - Destination of the projected records
/// * `removed` - Original-space column indices to drop
/// * `policy` - Treatment of fields without a `:` marker
pub fn project<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    removed: &BTreeSet<usize>,
    policy: MalformedFieldPolicy,
) -> Result<ProjectionStats> {
    project_lines(
        reader,
        writer,
        removed,
        policy,
        Path::new("<input>"),
        Path::new("<output>"),
    )
}

/// Projects the dataset at `input` into a new file at `output`.
/// The input file is never modified, and `output` is removed again when
/// projection fails part way.
pub fn project_file(
    input: &Path,
    output: &Path,
    removed: &BTreeSet<usize>,
    policy: MalformedFieldPolicy,
) -> Result<ProjectionStats> {
    let reader = BufReader::new(File::open(input).map_err(|e| AblateError::io(input, e))?);
    let mut writer = BufWriter::new(File::create(output).map_err(|e| AblateError::io(output, e))?);

    let result = project_lines(reader, &mut writer, removed, policy, input, output)
        .and_then(|stats| {
            writer.flush().map_err(|e| AblateError::io(output, e))?;
            Ok(stats)
        });
    drop(writer);
    let stats = match result {
        Ok(stats) => stats,
        Err(err) => {
            if let Err(e) = fs::remove_file(output) {
                debug!("Could not remove partial output {}: {}", output.display(), e);
            }
            return Err(err);
        }
    };

    debug!(
        "Projected {} -> {}: {} records, {} pairs kept, {} dropped",
        input.display(),
        output.display(),
        stats.records,
        stats.pairs_kept,
        stats.pairs_dropped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::record_label;
    use crate::test_utils::write_dataset;
    use tempfile::tempdir;

    fn project_str(input: &str, removed: &[usize], policy: MalformedFieldPolicy) -> Result<String> {
        let removed: BTreeSet<usize> = removed.iter().copied().collect();
        let mut output = Vec::new();
        project(input.as_bytes(), &mut output, &removed, policy)?;
        Ok(String::from_utf8(output).unwrap())
    }

    fn output_indices(line: &str) -> Vec<usize> {
        line.split('\t')
            .skip(1)
            .filter(|field| !field.is_empty())
            .map(|field| field.split_once(':').unwrap().0.parse().unwrap())
            .collect()
    }

    const DATASET: &str = "+1\t1:0.5\t2:0.3\t3:0.9\n\
                           -1\t2:0.1\t4:0.7\n\
                           +1\t\n\
                           -1\t1:0.2\t3:0.4\t4:0.6\t6:1\n";

    #[test]
    fn test_project_drops_and_renumbers() {
        let output =
            project_str("+1\t1:0.5\t2:0.3\t3:0.9\n", &[2], MalformedFieldPolicy::Reject).unwrap();
        assert_eq!(output, "+1\t1:0.5\t2:0.9\n");
    }

    #[test]
    fn test_project_all_removed_keeps_label() {
        let output = project_str("+1\t1:0.2\n", &[1], MalformedFieldPolicy::Reject).unwrap();
        assert_eq!(output, "+1\t\n");
    }

    #[test]
    fn test_project_renumbers_per_record() {
        let output = project_str("1\t3:0.1\t5:0.2\n2\t5:0.3\t9:0.4\n", &[3], MalformedFieldPolicy::Reject)
            .unwrap();
        assert_eq!(output, "1\t1:0.2\n2\t1:0.3\t2:0.4\n");
    }

    #[test]
    fn test_project_empty_removal_preserves_order_and_labels() {
        let output = project_str(DATASET, &[], MalformedFieldPolicy::Reject).unwrap();

        let input_labels: Vec<&str> = DATASET.lines().map(record_label).collect();
        let output_labels: Vec<&str> = output.lines().map(record_label).collect();
        assert_eq!(input_labels, output_labels);
    }

    #[test]
    fn test_project_empty_removal_is_idempotent() {
        let once = project_str(DATASET, &[], MalformedFieldPolicy::Reject).unwrap();
        let twice = project_str(&once, &[], MalformedFieldPolicy::Reject).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_project_indices_are_contiguous() {
        let cases: [Vec<usize>; 5] = [vec![], vec![1], vec![2, 4], vec![1, 3, 6], vec![1, 2, 3, 4, 6]];
        for removed in cases {
            let output = project_str(DATASET, &removed, MalformedFieldPolicy::Reject).unwrap();
            for line in output.lines() {
                let indices = output_indices(line);
                let expected: Vec<usize> = (1..=indices.len()).collect();
                assert_eq!(indices, expected, "removed {:?}, line {:?}", removed, line);
            }
        }
    }

    #[test]
    fn test_project_never_keeps_removed_columns() {
        // Values equal their original index so survivors can be traced back
        let input = "1\t1:1\t2:2\t3:3\t4:4\t5:5\n0\t2:2\t5:5\n";
        let removed = [2, 5];
        let output = project_str(input, &removed, MalformedFieldPolicy::Reject).unwrap();

        for line in output.lines() {
            for field in line.split('\t').skip(1).filter(|f| !f.is_empty()) {
                let original: usize = field.split_once(':').unwrap().1.parse().unwrap();
                assert!(!removed.contains(&original));
            }
        }
        assert_eq!(output, "1\t1:1\t2:3\t3:4\n0\t\n");
    }

    #[test]
    fn test_project_malformed_field_policies() {
        let input = "1\t1:0.5\tjunk\t3:0.9\n";

        let err = project_str(input, &[1], MalformedFieldPolicy::Reject).unwrap_err();
        assert!(err.to_string().contains("line 1"));

        let output = project_str(input, &[1], MalformedFieldPolicy::PassThrough).unwrap();
        assert_eq!(output, "1\tjunk\t1:0.9\n");
    }

    #[test]
    fn test_project_reports_line_of_bad_record() {
        let err = project_str("1\t1:0.5\n\n", &[], MalformedFieldPolicy::Reject).unwrap_err();
        match err {
            AblateError::Parse { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_project_file() {
        let dir = tempdir().unwrap();
        let input = write_dataset(dir.path(), "in.txt", DATASET);
        let output = dir.path().join("out.txt");
        let removed: BTreeSet<usize> = [4].into_iter().collect();

        let stats = project_file(&input, &output, &removed, MalformedFieldPolicy::Reject).unwrap();

        assert_eq!(stats.records, 4);
        assert_eq!(stats.pairs_dropped, 2);
        assert_eq!(stats.pairs_kept, 7);
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "+1\t1:0.5\t2:0.3\t3:0.9\n-1\t1:0.1\n+1\t\n-1\t1:0.2\t2:0.4\t3:1\n"
        );
        assert_eq!(std::fs::read_to_string(&input).unwrap(), DATASET);
    }

    #[test]
    fn test_project_file_missing_input() {
        let dir = tempdir().unwrap();
        let err = project_file(
            &dir.path().join("nope.txt"),
            &dir.path().join("out.txt"),
            &BTreeSet::new(),
            MalformedFieldPolicy::Reject,
        )
        .unwrap_err();
        assert!(matches!(err, AblateError::Io { .. }));
    }

    #[test]
    fn test_project_file_unwritable_output() {
        let dir = tempdir().unwrap();
        let input = write_dataset(dir.path(), "in.txt", DATASET);
        let output = dir.path().join("nodir").join("out.txt");

        let err = project_file(&input, &output, &BTreeSet::new(), MalformedFieldPolicy::Reject)
            .unwrap_err();
        match err {
            AblateError::Io { path, source } => {
                assert_eq!(path, output);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_project_file_parse_error_leaves_no_output() {
        let dir = tempdir().unwrap();
        let mut contents = String::new();
        for _ in 0..2000 {
            contents.push_str("+1\t1:0.5\t2:0.3\n");
        }
        contents.push_str("-1\t1:0.1\tbogus\n");
        let input = write_dataset(dir.path(), "in.txt", &contents);
        let output = dir.path().join("out.txt");

        let err = project_file(&input, &output, &BTreeSet::new(), MalformedFieldPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, AblateError::Parse { line: Some(2001), .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_removal_set_retain_mode() {
        let retain = ColumnSelection::Retain([2, 5].into_iter().collect());
        let removed: Vec<usize> = retain.removal_set(6).into_iter().collect();
        assert_eq!(removed, vec![1, 3, 4, 6]);

        let remove = ColumnSelection::Remove([3].into_iter().collect());
        assert_eq!(remove.removal_set(6).into_iter().collect::<Vec<_>>(), vec![3]);
    }
}
