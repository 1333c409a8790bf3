use crate::{AblateError, Result};

/// Parses the accuracy percentage out of a report of the form
/// `Accuracy = 87.5000% (175/200) (classification)`.
///
/// The accuracy line is the first line starting with `Accuracy`; when there is
/// none the first line is used and must still follow that layout. Tokens are
/// separated by single spaces and the accuracy is the third token.
pub fn parse_accuracy(text: &str) -> Result<f64> {
    let line = text
        .lines()
        .find(|line| line.starts_with("Accuracy"))
        .or_else(|| text.lines().next())
        .ok_or_else(|| AblateError::parse("accuracy report is empty"))?;

    let token = line.trim_end().split(' ').nth(2).ok_or_else(|| {
        AblateError::parse(format!("accuracy report line '{}' has no third token", line))
    })?;

    token
        .strip_suffix('%')
        .unwrap_or(token)
        .parse::<f64>()
        .map_err(|_| AblateError::parse(format!("accuracy token '{}' is not a percentage", token)))
}
