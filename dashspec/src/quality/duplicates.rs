//! Duplicate row handling.

use super::DqLogEntry;
use crate::compiler::DuplicatePlan;
use crate::dataset::{Column, Dataset};
use crate::error::Result;
use crate::spec::{DuplicateAction, DuplicateKeep};
use arrow::array::BooleanArray;
use std::collections::HashSet;
use std::sync::Arc;

/// Column added by the `flag` action.
pub const DUPLICATE_FLAG_COLUMN: &str = "_duplicate_flag";

const STEP: &str = "duplicates";
const NULL_KEY: &str = "\u{0}";
const SEPARATOR: char = '\u{1f}';

/// Marks every row that repeats an earlier kept row on the compared columns.
pub fn duplicate_rows(columns: &[Column<'_>], rows: usize, keep: DuplicateKeep) -> Vec<bool> {
    let mut seen = HashSet::with_capacity(rows);
    let mut duplicate = vec![false; rows];
    let order: Box<dyn Iterator<Item = usize>> = match keep {
        DuplicateKeep::First => Box::new(0..rows),
        DuplicateKeep::Last => Box::new((0..rows).rev()),
    };
    for row in order {
        let key = columns
            .iter()
            .map(|column| column.key_at(row).unwrap_or_else(|| NULL_KEY.to_string()))
            .collect::<Vec<_>>()
            .join(&SEPARATOR.to_string());
        if !seen.insert(key) {
            duplicate[row] = true;
        }
    }
    duplicate
}

pub(crate) fn apply(
    dataset: &Dataset,
    plan: &DuplicatePlan,
    log: &mut Vec<DqLogEntry>,
) -> Result<Dataset> {
    let names: Vec<String> = if plan.subset.is_empty() {
        dataset.column_names()
    } else {
        plan.subset.iter().map(|f| f.name.clone()).collect()
    };
    let label = if plan.subset.is_empty() {
        "*".to_string()
    } else {
        names.join(",")
    };

    let columns: Option<Vec<Column<'_>>> = names.iter().map(|name| dataset.column(name)).collect();
    let Some(columns) = columns.filter(|c| !c.is_empty()) else {
        log.push(DqLogEntry::degraded(
            label,
            STEP,
            plan.action.as_str(),
            0,
            "compared columns not in dataset, skipped",
        ));
        return Ok(dataset.clone());
    };

    let rows = dataset.num_rows();
    let duplicate = duplicate_rows(&columns, rows, plan.keep);
    let count = duplicate.iter().filter(|d| **d).count();

    let result = match plan.action {
        DuplicateAction::Drop => {
            let keep: Vec<bool> = duplicate.iter().map(|d| !d).collect();
            dataset.filter_rows(&keep)?
        }
        DuplicateAction::Flag => dataset.with_column(
            DUPLICATE_FLAG_COLUMN,
            Arc::new(BooleanArray::from(duplicate)),
        )?,
    };
    log.push(DqLogEntry::applied(
        label,
        STEP,
        plan.action.as_str(),
        count,
        format!("{count} duplicate row(s), keep {}", plan.keep),
    ));
    Ok(result)
}
