// 🏗️ Parser Framework - format detection and per-issuer reconstruction
//
// A closed set of known statement layouts. Detection only looks at fixed
// anchors on the first/last page (or the CSV account cell); a document
// that matches none of them is rejected, never guessed.

pub mod ocbc_account;
pub mod ocbc_card;
pub mod posb;
pub mod uob_account;
pub mod uob_card;

use crate::columns::LayoutError;
use crate::config::{FormatTunings, LayoutTuning};
use crate::error::{IngestError, Location};
use crate::layout::{Document, Element, Fragment};
use crate::record::{Holder, StatementRecord};
use crate::rows::{assemble_into, reading_order, LogicalRow, RowRules};
use crate::scanner::ScannedTable;
use serde::Serialize;
use std::fmt;
use std::path::Path;

// ============================================================================
// FORMAT KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    OcbcAccount,
    OcbcCard,
    UobAccount,
    UobCard,
    PosbAccountCsv,
}

impl FormatKind {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            FormatKind::OcbcAccount => "OCBC account statement",
            FormatKind::OcbcCard => "OCBC card statement",
            FormatKind::UobAccount => "UOB account statement",
            FormatKind::UobCard => "UOB card statement",
            FormatKind::PosbAccountCsv => "POSB account CSV export",
        }
    }

    /// Key used in config files and the audit log
    pub fn code(&self) -> &'static str {
        match self {
            FormatKind::OcbcAccount => "ocbc_account",
            FormatKind::OcbcCard => "ocbc_card",
            FormatKind::UobAccount => "uob_account",
            FormatKind::UobCard => "uob_card",
            FormatKind::PosbAccountCsv => "posb_account_csv",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SOURCE DOCUMENTS
// ============================================================================

/// A document as handed over by the extraction step.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Positioned elements of a page-oriented statement.
    Pages(Document),
    /// Raw cells of a row-oriented export.
    Csv { name: String, rows: Vec<Vec<String>> },
}

impl Source {
    pub fn name(&self) -> &str {
        match self {
            Source::Pages(document) => &document.name,
            Source::Csv { name, .. } => name,
        }
    }

    /// `.json` holds an extracted page document, `.csv` a bank export.
    pub fn from_bytes(name: &str, extension: &str, bytes: &[u8]) -> Result<Source, IngestError> {
        match extension.to_ascii_lowercase().as_str() {
            "json" => {
                let mut document: Document = serde_json::from_slice(bytes)?;
                if document.name.is_empty() {
                    document.name = name.to_string();
                }
                Ok(Source::Pages(document))
            }
            "csv" => {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(bytes);
                let mut rows = Vec::new();
                for record in reader.records() {
                    let record = record?;
                    rows.push(record.iter().map(str::to_string).collect());
                }
                Ok(Source::Csv {
                    name: name.to_string(),
                    rows,
                })
            }
            _ => Err(IngestError::UnrecognizedFormat {
                location: Location::document(name),
            }),
        }
    }

    pub fn from_path(path: &Path) -> Result<Source, IngestError> {
        let bytes = std::fs::read(path)?;
        Source::from_bytes(&document_name(path), &extension(path), &bytes)
    }

    pub(crate) fn document(&self) -> Result<&Document, IngestError> {
        match self {
            Source::Pages(document) => Ok(document),
            Source::Csv { name, .. } => Err(IngestError::UnrecognizedFormat {
                location: Location::document(name),
            }),
        }
    }
}

/// File stem, used as the statement's file name.
pub fn document_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

pub fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

// ============================================================================
// DETECTION
// ============================================================================

const UOB_FOOTER_PREFIX: &str = "United Overseas Bank Limited";
const OCBC_PREFIX: &str = "OCBC";
const OCBC_ACCOUNT_TITLE: &str = "STATEMENT OF ACCOUNT";
const OCBC_CARD_FOOTER_SUFFIX: &str = "Only requests from Principal Cardmembers are accepted.";

/// Identify the layout from first/last page anchors alone.
pub fn detect_format(source: &Source) -> Result<FormatKind, IngestError> {
    let detected = match source {
        Source::Pages(document) => detect_pages(document),
        Source::Csv { rows, .. } => detect_csv(rows),
    };
    detected.ok_or_else(|| IngestError::UnrecognizedFormat {
        location: Location::document(source.name()),
    })
}

fn detect_pages(document: &Document) -> Option<FormatKind> {
    let first = document.first_page()?;
    let last = document.last_page()?;

    let trailing = first.elements.last().map(Element::text).unwrap_or_default();
    if trailing.starts_with(UOB_FOOTER_PREFIX) {
        let title = first
            .paragraphs
            .get(2)
            .and_then(Element::as_paragraph)
            .and_then(|p| p.lines.first())
            .map(|l| l.text.as_str());
        return match title {
            Some("Statement of Account") => Some(FormatKind::UobAccount),
            Some("Credit Card(s) Statement") => Some(FormatKind::UobCard),
            _ => None,
        };
    }

    if first.element_text(0)?.starts_with(OCBC_PREFIX) {
        if first.element_text(9).as_deref() == Some(OCBC_ACCOUNT_TITLE) {
            return Some(FormatKind::OcbcAccount);
        }
        let third_last = last
            .elements
            .len()
            .checked_sub(3)
            .and_then(|i| last.element_text(i));
        if third_last.is_some_and(|t| t.ends_with(OCBC_CARD_FOOTER_SUFFIX)) {
            return Some(FormatKind::OcbcCard);
        }
    }
    None
}

fn detect_csv(rows: &[Vec<String>]) -> Option<FormatKind> {
    let account_cell = rows.first()?.get(1)?;
    account_cell
        .trim()
        .starts_with("POSB")
        .then_some(FormatKind::PosbAccountCsv)
}

// ============================================================================
// PARSERS
// ============================================================================

/// What a parser may need beyond the document itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseContext {
    /// Holder for exports that do not print one.
    pub holder: Option<Holder>,
    pub tunings: FormatTunings,
}

impl ParseContext {
    pub fn tuning(&self, kind: FormatKind) -> LayoutTuning {
        self.tunings.for_format(kind)
    }
}

/// One reconstruction procedure per layout.
///
/// Adding a layout means a new variant and a new implementation; the
/// shared column, row and scan machinery stays untouched.
pub trait StatementParser: Send + Sync {
    fn format(&self) -> FormatKind;

    fn parse(&self, source: &Source, context: &ParseContext) -> Result<StatementRecord, IngestError>;
}

pub fn get_parser(kind: FormatKind) -> Box<dyn StatementParser> {
    match kind {
        FormatKind::OcbcAccount => Box::new(ocbc_account::OcbcAccountParser),
        FormatKind::OcbcCard => Box::new(ocbc_card::OcbcCardParser),
        FormatKind::UobAccount => Box::new(uob_account::UobAccountParser),
        FormatKind::UobCard => Box::new(uob_card::UobCardParser),
        FormatKind::PosbAccountCsv => Box::new(posb::PosbCsvParser),
    }
}

/// Detect the layout and reconstruct the statement.
pub fn parse_source(source: &Source, context: &ParseContext) -> Result<(FormatKind, StatementRecord), IngestError> {
    let kind = detect_format(source)?;
    let record = get_parser(kind).parse(source, context)?;
    Ok((kind, record))
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Every fragment an element carries, in extraction order.
pub(crate) fn element_fragments(element: &Element) -> Vec<&Fragment> {
    match element {
        Element::Text(fragment) => vec![fragment],
        Element::Table(table) => table.fragments().collect(),
        Element::Paragraph(paragraph) => paragraph.lines.iter().collect(),
    }
}

/// Assemble a scanned table page by page; continuation lines at the top of
/// a page fold into the last record of the previous page.
pub(crate) fn assemble_table(table: &ScannedTable, rules: &RowRules) -> Vec<LogicalRow> {
    let mut rows = Vec::new();
    for segment in &table.segments {
        let ordered = reading_order(&segment.fragments);
        assemble_into(&mut rows, &ordered, &segment.layout, rules, segment.page);
    }
    rows
}

pub(crate) fn row_rules(tuning: &LayoutTuning) -> RowRules {
    RowRules {
        row_tolerance: tuning.row_tolerance,
        continuation_gap: tuning.continuation_gap,
        ..RowRules::default()
    }
}

pub(crate) fn layout_error(location: &Location, err: LayoutError) -> IngestError {
    match err {
        LayoutError::MissingColumn(column) => IngestError::MissingMandatoryColumn {
            location: location.clone(),
            column: column.to_string(),
        },
        overlap @ LayoutError::Overlap(..) => IngestError::structural(location.clone(), overlap.to_string()),
    }
}

pub(crate) fn require<T>(value: Option<T>, location: &Location, what: &str) -> Result<T, IngestError> {
    value.ok_or_else(|| IngestError::structural(location.clone(), format!("expected {}", what)))
}
