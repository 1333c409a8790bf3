use crate::{parse_record, AblateError, MalformedFieldPolicy, Result};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

fn open_dataset(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| AblateError::io(path, e))?;
    Ok(BufReader::new(file))
}

/// Counts the lines of a file by reading it sequentially.
/// A final line without a terminating newline is counted as well.
pub fn count_lines(path: &Path) -> Result<usize> {
    let mut reader = open_dataset(path)?;
    let mut buffer = Vec::new();
    let mut count = 0;

    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .map_err(|e| AblateError::io(path, e))?;
        if read == 0 {
            break;
        }
        count += 1;
    }

    debug!("{} has {} lines", path.display(), count);
    Ok(count)
}

/// Loads all lines of a dataset into memory, without line terminators
pub fn load_lines(path: &Path) -> Result<Vec<String>> {
    let reader = open_dataset(path)?;
    reader
        .lines()
        .collect::<std::io::Result<Vec<String>>>()
        .map_err(|e| AblateError::io(path, e))
}

/// Finds the largest feature index used anywhere in a dataset
///
/// # Returns
/// 0 when the dataset has no feature pairs at all
pub fn max_feature_index(path: &Path, policy: MalformedFieldPolicy) -> Result<usize> {
    let reader = open_dataset(path)?;
    let mut max_index = 0;

    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AblateError::io(path, e))?;
        let record = parse_record(&line, i + 1, policy).map_err(|e| e.with_path(path))?;
        if let Some(index) = record.indices().max() {
            max_index = max_index.max(index);
        }
    }

    Ok(max_index)
}
