use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::model::{CellValue, ListingTable, Observations};

// ---------------------------------------------------------------------------
// Outcome mapping: categorical label → numeric code
// ---------------------------------------------------------------------------

/// Maps categorical outcome labels (e.g. `"ja"`/`"nein"`) to numbers.
///
/// When a mapping is in effect, a label that is not listed counts as
/// missing, even if it would parse as a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeMapping(pub BTreeMap<String, f64>);

impl OutcomeMapping {
    /// `"ja"` → 1, `"nein"` → 0.
    pub fn ja_nein() -> Self {
        Self::binary("ja", "nein")
    }

    /// `"yes"` → 1, `"no"` → 0.
    pub fn yes_no() -> Self {
        Self::binary("yes", "no")
    }

    pub fn binary(positive: &str, negative: &str) -> Self {
        OutcomeMapping(BTreeMap::from([
            (positive.to_string(), 1.0),
            (negative.to_string(), 0.0),
        ]))
    }

    pub fn lookup(&self, value: &CellValue) -> Option<f64> {
        value.label().and_then(|l| self.0.get(&l).copied())
    }
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

/// Row accounting for one cleaning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleaningReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped_predictor: usize,
    pub dropped_outcome: usize,
}

impl CleaningReport {
    pub fn rows_dropped(&self) -> usize {
        self.rows_read - self.rows_kept
    }
}

/// Coerce the predictor and outcome columns to numbers and keep the rows
/// where both succeeded.
///
/// No imputation: a row that fails either coercion is excluded. A row
/// failing both counts toward `dropped_predictor` only.
pub fn clean(
    table: &ListingTable,
    predictor: &str,
    outcome: &str,
    mapping: Option<&OutcomeMapping>,
) -> Result<(Observations, CleaningReport)> {
    for col in [predictor, outcome] {
        if !table.has_column(col) {
            bail!("column '{col}' not found; available: {:?}", table.column_names);
        }
    }

    let mut report = CleaningReport {
        rows_read: table.len(),
        rows_kept: 0,
        dropped_predictor: 0,
        dropped_outcome: 0,
    };
    let mut xs = Vec::with_capacity(table.len());
    let mut ys = Vec::with_capacity(table.len());

    for (row_no, (x_cell, y_cell)) in table
        .column(predictor)
        .zip(table.column(outcome))
        .enumerate()
    {
        let Some(x) = x_cell.to_number() else {
            log::debug!("row {row_no}: dropping, predictor '{x_cell}' is not numeric");
            report.dropped_predictor += 1;
            continue;
        };
        let y = match mapping {
            Some(m) => m.lookup(y_cell),
            None => y_cell.to_number(),
        };
        let Some(y) = y else {
            log::debug!("row {row_no}: dropping, outcome '{y_cell}' is not usable");
            report.dropped_outcome += 1;
            continue;
        };
        xs.push(x);
        ys.push(y);
    }

    report.rows_kept = xs.len();
    let observations = Observations {
        predictor_name: predictor.to_string(),
        outcome_name: outcome.to_string(),
        predictor: xs,
        outcome: ys,
    };
    Ok((observations, report))
}
