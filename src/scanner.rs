// 🔎 Table Scanner - single pass over the element stream
//
//   BeforeTable ──start──▶ InHeader ──labels complete──▶ InRows ──end──▶ AfterTable
//
// Issuer formats decide what an element *means* (ScanRules → Cue); the
// scanner owns the state, the column bands and the collected fragments.

use crate::columns::{label_spec, ColumnLayout, ColumnSpec, LayoutError};
use crate::error::{IngestError, Location};
use crate::layout::{Document, Element, Fragment};
use tracing::{debug, trace};

// ============================================================================
// STATES AND CUES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    BeforeTable,
    InHeader,
    InRows,
    AfterTable,
}

/// What an element means to the scan, as decided by the issuer format.
#[derive(Debug, Clone, PartialEq)]
pub enum Cue<'e> {
    /// A section marker opens a new table. `key` names the instrument
    /// when the marker carries it.
    Start { key: Option<String> },
    /// Names the instrument of the open table.
    Key(String),
    /// A column header label.
    Label(&'e Fragment),
    /// Candidate row content.
    Rows(Vec<&'e Fragment>),
    /// Closes the open table; another may start later.
    End,
    /// Closes the open table and stops the scan.
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    Start,
    Key,
    Label,
    Rows,
    End,
    Finish,
}

impl Cue<'_> {
    pub fn kind(&self) -> CueKind {
        match self {
            Cue::Start { .. } => CueKind::Start,
            Cue::Key(_) => CueKind::Key,
            Cue::Label(_) => CueKind::Label,
            Cue::Rows(_) => CueKind::Rows,
            Cue::End => CueKind::End,
            Cue::Finish => CueKind::Finish,
        }
    }
}

/// Pure transition. `header_ready` is true once every mandatory column
/// has a band.
pub fn next_state(state: ScanState, cue: CueKind, header_ready: bool) -> ScanState {
    use ScanState::*;
    match (state, cue) {
        (_, CueKind::Start) if header_ready => InRows,
        (_, CueKind::Start) => InHeader,
        (_, CueKind::End | CueKind::Finish) => AfterTable,
        (InHeader, CueKind::Label) if header_ready => InRows,
        (state, _) => state,
    }
}

/// State carried onto the next page. An open table stays open.
pub fn on_page_break(state: ScanState) -> ScanState {
    match state {
        ScanState::InRows => ScanState::InRows,
        ScanState::InHeader => ScanState::InHeader,
        ScanState::BeforeTable | ScanState::AfterTable => ScanState::BeforeTable,
    }
}

// ============================================================================
// ISSUER HOOK
// ============================================================================

/// An element together with its neighbours.
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'e> {
    pub page: usize,
    pub index: usize,
    pub elements: &'e [Element],
}

impl<'e> ElementRef<'e> {
    pub fn element(&self) -> &'e Element {
        &self.elements[self.index]
    }

    /// The element `back` positions earlier on the same page.
    pub fn before(&self, back: usize) -> Option<&'e Element> {
        self.index.checked_sub(back).and_then(|i| self.elements.get(i))
    }

    pub fn after(&self, ahead: usize) -> Option<&'e Element> {
        self.elements.get(self.index + ahead)
    }
}

pub trait ScanRules {
    /// Interpret one element. An empty vector skips it.
    fn cues<'e>(&mut self, at: ElementRef<'e>, state: ScanState) -> Vec<Cue<'e>>;
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub page: usize,
    pub element: usize,
}

/// The part of a table that sits on one page. Coordinates are only
/// comparable within a page, so rows are assembled per segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub page: usize,
    pub layout: ColumnLayout,
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScannedTable {
    pub key: Option<String>,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanOutcome {
    pub tables: Vec<ScannedTable>,
    /// Where a Finish cue stopped the scan.
    pub stopped_at: Option<Cursor>,
}

// ============================================================================
// SCANNER
// ============================================================================

pub struct TableScanner<'s> {
    specs: &'s [ColumnSpec],
    tolerance: f64,
}

struct OpenTable {
    key: Option<String>,
    segments: Vec<Segment>,
    pending: Option<(usize, Vec<Fragment>)>,
}

struct Run<'d> {
    document: &'d Document,
    state: ScanState,
    layout: Option<ColumnLayout>,
    page_labels: Vec<Fragment>,
    open: Option<OpenTable>,
    last_key: Option<String>,
    outcome: ScanOutcome,
}

impl<'s> TableScanner<'s> {
    pub fn new(specs: &'s [ColumnSpec], tolerance: f64) -> Self {
        TableScanner { specs, tolerance }
    }

    /// Scan `document` from `from` until a Finish cue or the last page.
    pub fn scan<R: ScanRules>(
        &self,
        document: &Document,
        from: Cursor,
        rules: &mut R,
    ) -> Result<ScanOutcome, IngestError> {
        let mut run = Run {
            document,
            state: ScanState::BeforeTable,
            layout: None,
            page_labels: Vec::new(),
            open: None,
            last_key: None,
            outcome: ScanOutcome::default(),
        };

        for (page, content) in document.pages.iter().enumerate().skip(from.page) {
            let start = if page == from.page {
                from.element
            } else {
                run.state = on_page_break(run.state);
                run.page_labels.clear();
                0
            };

            for index in start..content.elements.len() {
                let at = ElementRef {
                    page,
                    index,
                    elements: &content.elements,
                };
                let cues = rules.cues(at, run.state);
                for cue in cues {
                    let kind = cue.kind();
                    self.apply(&mut run, cue, page)?;
                    let next = next_state(run.state, kind, run.layout.is_some());
                    trace!(page, index, ?kind, from = ?run.state, to = ?next, "scan transition");
                    run.state = next;

                    if kind == CueKind::Finish {
                        run.outcome.stopped_at = Some(Cursor {
                            page,
                            element: index,
                        });
                        return Ok(run.outcome);
                    }
                }
            }

            run.flush_segment();
        }

        let last_page = document.pages.len().saturating_sub(1);
        self.close_table(&mut run, last_page)?;
        Ok(run.outcome)
    }

    fn apply(&self, run: &mut Run<'_>, cue: Cue<'_>, page: usize) -> Result<(), IngestError> {
        match cue {
            Cue::Start { key } => {
                self.close_table(run, page)?;
                run.open = Some(OpenTable {
                    key,
                    segments: Vec::new(),
                    pending: None,
                });
            }
            Cue::Key(key) => {
                if let Some(open) = run.open.as_mut() {
                    open.key = Some(key);
                }
            }
            Cue::Label(fragment) => self.take_label(run, fragment, page)?,
            Cue::Rows(fragments) => {
                if run.state != ScanState::InRows {
                    debug!(page, state = ?run.state, "row content outside a table body, ignored");
                    return Ok(());
                }
                if let Some(open) = run.open.as_mut() {
                    let pending = open.pending.get_or_insert_with(|| (page, Vec::new()));
                    pending.1.extend(fragments.into_iter().cloned());
                }
            }
            Cue::End | Cue::Finish => self.close_table(run, page)?,
        }
        Ok(())
    }

    fn take_label(&self, run: &mut Run<'_>, fragment: &Fragment, page: usize) -> Result<(), IngestError> {
        let Some(spec) = label_spec(self.specs, &fragment.text) else {
            return Ok(());
        };
        run.page_labels.push(fragment.clone());

        match run.layout.as_mut() {
            Some(layout) => layout.reanchor(spec, fragment, self.tolerance),
            None => {
                let labels: Vec<&Fragment> = run.page_labels.iter().collect();
                match ColumnLayout::resolve(&labels, self.specs, self.tolerance) {
                    Ok(layout) => run.layout = Some(layout),
                    Err(LayoutError::MissingColumn(_)) => {}
                    Err(err @ LayoutError::Overlap(..)) => {
                        return Err(IngestError::structural(
                            Location::page(&run.document.name, page),
                            err.to_string(),
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    fn close_table(&self, run: &mut Run<'_>, page: usize) -> Result<(), IngestError> {
        if run.open.is_none() {
            return Ok(());
        }
        if run.state == ScanState::InHeader {
            let labels: Vec<&Fragment> = run.page_labels.iter().collect();
            let column = match ColumnLayout::resolve(&labels, self.specs, self.tolerance) {
                Err(LayoutError::MissingColumn(label)) => label.to_string(),
                _ => "header".to_string(),
            };
            return Err(IngestError::MissingMandatoryColumn {
                location: Location::page(&run.document.name, page),
                column,
            });
        }

        run.flush_segment();
        if let Some(open) = run.open.take() {
            let key = open.key.or_else(|| run.last_key.clone());
            run.last_key = key.clone();
            run.outcome.tables.push(ScannedTable {
                key,
                segments: open.segments,
            });
        }
        Ok(())
    }
}

impl Run<'_> {
    fn flush_segment(&mut self) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let Some((page, fragments)) = open.pending.take() else {
            return;
        };
        if let Some(layout) = &self.layout {
            open.segments.push(Segment {
                page,
                layout: layout.clone(),
                fragments,
            });
        }
    }
}
