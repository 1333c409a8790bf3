use crate::parsing::record_label;
use crate::{AblateError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Chooses `size` lines for the held-out sample, keeping each label's share
/// of the sample proportional to its share of the dataset.
///
/// Every label first receives the floor of its proportional quota; the
/// remaining slots are filled from a random draw over the lines not yet taken.
///
/// # Returns
/// A mask with one entry per line, `true` for lines in the sample
pub fn stratified_sample<R: Rng + ?Sized>(
    lines: &[String],
    size: usize,
    rng: &mut R,
) -> Result<Vec<bool>> {
    let total = lines.len();
    if size > total {
        return Err(AblateError::Config(format!(
            "cannot sample {} records from a dataset of {}",
            size, total
        )));
    }

    let mut by_label: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, line) in lines.iter().enumerate() {
        by_label.entry(record_label(line)).or_default().push(i);
    }

    let mut selected = vec![false; total];
    let mut leftover = Vec::new();
    let mut taken = 0;

    for indices in by_label.values_mut() {
        indices.shuffle(rng);
        let quota = size * indices.len() / total;
        for &i in &indices[..quota] {
            selected[i] = true;
        }
        taken += quota;
        leftover.extend_from_slice(&indices[quota..]);
    }

    leftover.shuffle(rng);
    for &i in leftover.iter().take(size - taken) {
        selected[i] = true;
    }

    Ok(selected)
}
