// 🧱 Row Assembler - fragments → lines → logical records
//
// Fragments sharing a baseline (within row_tolerance) form one line.
// A line becomes a new record unless it is a continuation:
//   - it lacks the terminal column's value, or
//   - it sits within continuation_gap of the line above.
// Continuations fold into the record above; never into the one below.

use crate::columns::{ColumnKind, ColumnLayout};
use crate::layout::Fragment;
use crate::literal::{self, Amount};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// LOGICAL ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Date(NaiveDate),
    Amount(Amount),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalRow {
    /// Page the record started on.
    pub page: usize,
    /// Baseline of the record's first line.
    pub y: f64,
    values: BTreeMap<&'static str, CellValue>,
    /// Continuation lines, top to bottom.
    pub sub_description: Vec<String>,
}

impl LogicalRow {
    fn new(page: usize, y: f64) -> Self {
        LogicalRow {
            page,
            y,
            values: BTreeMap::new(),
            sub_description: Vec::new(),
        }
    }

    pub fn has(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        match self.values.get(column) {
            Some(CellValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn amount(&self, column: &str) -> Option<Amount> {
        match self.values.get(column) {
            Some(CellValue::Amount(a)) => Some(*a),
            _ => None,
        }
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        match self.values.get(column) {
            Some(CellValue::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// RULES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RowRules {
    /// Max baseline difference for two fragments to share a line.
    pub row_tolerance: f64,
    /// A line at most this far below the previous line continues it.
    pub continuation_gap: Option<f64>,
    /// Column whose presence marks the start of a new record.
    pub terminal: Option<&'static str>,
    /// Column whose text moves to the sub-description on continuation lines.
    pub description: Option<&'static str>,
    /// Supplies the year for "17 Mar" style dates.
    pub statement_date: Option<NaiveDate>,
}

impl Default for RowRules {
    fn default() -> Self {
        RowRules {
            row_tolerance: 3.0,
            continuation_gap: None,
            terminal: None,
            description: None,
            statement_date: None,
        }
    }
}

// ============================================================================
// ASSEMBLY
// ============================================================================

/// Top-to-bottom, left-to-right order. The source origin is bottom-left,
/// so higher baselines come first. Ties keep scan order. Baselines that
/// differ slightly are put back in x order by `group_lines`.
pub fn reading_order(fragments: &[Fragment]) -> Vec<&Fragment> {
    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by(|a, b| {
        b.y0()
            .partial_cmp(&a.y0())
            .unwrap_or(Ordering::Equal)
            .then(a.x0().partial_cmp(&b.x0()).unwrap_or(Ordering::Equal))
    });
    ordered
}

struct Line<'f> {
    y: f64,
    fragments: Vec<&'f Fragment>,
}

fn group_lines<'f>(fragments: &[&'f Fragment], tolerance: f64) -> Vec<Line<'f>> {
    let mut lines: Vec<Line<'f>> = Vec::new();
    for &fragment in fragments {
        match lines.last_mut() {
            Some(line) if (line.y - fragment.y0()).abs() < tolerance => {
                line.fragments.push(fragment)
            }
            _ => lines.push(Line {
                y: fragment.y0(),
                fragments: vec![fragment],
            }),
        }
    }
    for line in &mut lines {
        line.fragments
            .sort_by(|a, b| a.x0().partial_cmp(&b.x0()).unwrap_or(Ordering::Equal));
    }
    lines
}

fn parse_cell(kind: ColumnKind, text: &str, rules: &RowRules) -> Option<CellValue> {
    match kind {
        ColumnKind::Date => literal::parse_row_date(text, rules.statement_date).map(CellValue::Date),
        ColumnKind::Amount => literal::parse_amount(text).map(CellValue::Amount),
        ColumnKind::Text => {
            let text = text.trim();
            (!text.is_empty()).then(|| CellValue::Text(text.to_string()))
        }
    }
}

fn classify_line(line: &Line<'_>, layout: &ColumnLayout, rules: &RowRules, page: usize) -> LogicalRow {
    let mut row = LogicalRow::new(page, line.y);
    for fragment in &line.fragments {
        let Some(band) = layout.classify(fragment) else {
            continue;
        };
        let Some(value) = parse_cell(band.kind, &fragment.text, rules) else {
            debug!(column = band.name, literal = %fragment.text, "literal does not parse for column");
            continue;
        };
        match row.values.entry(band.name) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
                (CellValue::Text(existing), CellValue::Text(more)) => {
                    existing.push(' ');
                    existing.push_str(&more);
                }
                _ => {
                    debug!(column = band.name, literal = %fragment.text, "column already filled on this line");
                }
            },
        }
    }
    row
}

fn fold_continuation(target: &mut LogicalRow, line: LogicalRow, rules: &RowRules) {
    for (column, value) in line.values {
        if Some(column) == rules.description {
            if let CellValue::Text(text) = value {
                target.sub_description.push(text);
            }
            continue;
        }
        match target.values.entry(column) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => {
                if let (CellValue::Text(existing), CellValue::Text(more)) = (slot.get_mut(), value) {
                    existing.push(' ');
                    existing.push_str(&more);
                }
            }
        }
    }
}

/// Assemble `fragments` (already in reading order) and append the records
/// to `rows`. A leading continuation line folds into the last row already
/// present, so one table may be assembled page by page.
pub fn assemble_into(
    rows: &mut Vec<LogicalRow>,
    fragments: &[&Fragment],
    layout: &ColumnLayout,
    rules: &RowRules,
    page: usize,
) {
    let mut previous_y: Option<f64> = None;

    for line in group_lines(fragments, rules.row_tolerance) {
        let candidate = classify_line(&line, layout, rules, page);
        if candidate.is_empty() {
            continue;
        }

        let lacks_terminal = rules.terminal.is_some_and(|t| !candidate.has(t));
        let within_gap = match (rules.continuation_gap, previous_y) {
            (Some(gap), Some(prev)) => prev - line.y <= gap,
            _ => false,
        };
        previous_y = Some(line.y);

        if lacks_terminal || within_gap {
            match rows.last_mut() {
                Some(last) => fold_continuation(last, candidate, rules),
                None if lacks_terminal => {
                    debug!(page, y = line.y, "continuation line before any record, dropped");
                }
                None => rows.push(candidate),
            }
        } else {
            rows.push(candidate);
        }
    }
}

pub fn assemble(
    fragments: &[&Fragment],
    layout: &ColumnLayout,
    rules: &RowRules,
    page: usize,
) -> Vec<LogicalRow> {
    let mut rows = Vec::new();
    assemble_into(&mut rows, fragments, layout, rules, page);
    rows
}
