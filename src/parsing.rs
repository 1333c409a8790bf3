use crate::{AblateError, MalformedFieldPolicy, Result};

/// A single field following the label of a sparse record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    /// An `index:value` pair, value kept as the original text
    Pair { index: usize, value: &'a str },
    /// A field without a `:` marker, only produced under `MalformedFieldPolicy::PassThrough`
    Malformed(&'a str),
}

/// One line of a sparse (LIBSVM-style) dataset, borrowing from the line text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseRecord<'a> {
    pub label: &'a str,
    pub fields: Vec<Field<'a>>,
}

impl<'a> SparseRecord<'a> {
    /// Iterates over the feature indices of the well-formed pairs
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields.iter().filter_map(|field| match field {
            Field::Pair { index, .. } => Some(*index),
            Field::Malformed(_) => None,
        })
    }
}

/// Parses a single `index:value` field
///
/// # Arguments
/// * `field` - Field text, without surrounding tabs
/// * `line_number` - 1-based line number used in error messages
pub fn parse_feature_field(field: &str, line_number: usize) -> Result<Option<(usize, &str)>> {
    let Some((index_str, value)) = field.split_once(':') else {
        return Ok(None);
    };

    let index = index_str.parse::<usize>().map_err(|_| AblateError::Parse {
        path: None,
        line: Some(line_number),
        message: format!("feature index '{}' is not a positive integer", index_str),
    })?;
    if index == 0 {
        return Err(AblateError::Parse {
            path: None,
            line: Some(line_number),
            message: "feature indices start at 1, found 0".to_string(),
        });
    }

    Ok(Some((index, value)))
}

/// Parses a tab-separated sparse record `label<TAB>i1:v1<TAB>i2:v2...`
///
/// A trailing carriage return is ignored, as are empty fields left behind
/// by repeated or trailing tabs.
///
/// # Arguments
/// * `line` - Line text without the terminating newline
/// * `line_number` - 1-based line number used in error messages
/// * `policy` - How fields lacking a `:` are treated
pub fn parse_record(
    line: &str,
    line_number: usize,
    policy: MalformedFieldPolicy,
) -> Result<SparseRecord<'_>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut parts = line.split('\t');

    let label = parts.next().unwrap_or("");
    if label.trim().is_empty() {
        return Err(AblateError::Parse {
            path: None,
            line: Some(line_number),
            message: "missing label".to_string(),
        });
    }
    if label.trim().parse::<f64>().is_err() {
        return Err(AblateError::Parse {
            path: None,
            line: Some(line_number),
            message: format!("label '{}' is not numeric", label),
        });
    }

    let mut fields = Vec::new();
    for part in parts.filter(|part| !part.is_empty()) {
        match parse_feature_field(part, line_number)? {
            Some((index, value)) => fields.push(Field::Pair { index, value }),
            None => match policy {
                MalformedFieldPolicy::Reject => {
                    return Err(AblateError::Parse {
                        path: None,
                        line: Some(line_number),
                        message: format!("field '{}' has no ':' feature marker", part),
                    })
                }
                MalformedFieldPolicy::PassThrough => fields.push(Field::Malformed(part)),
            },
        }
    }

    Ok(SparseRecord { label, fields })
}

/// Extracts the label of a record without validating its features
pub fn record_label(line: &str) -> &str {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.split('\t').next().unwrap_or("").trim()
}
