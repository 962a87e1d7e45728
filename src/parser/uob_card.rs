// 💳 UOB card statements
//
// Page one: holder block (paragraph 1), "Total Credit Limit" row, and the
// card summary opened by "Credit Card(s) Statement" + "Summary". The
// summary ends at the first element below its table's last row.
//
// Transactions follow, one section per card, each headed by the card
// name and a "<card number> <NAME ON CARD>" line. A card missing from the
// summary is a supplementary card. The final two pages carry no
// transactions; the last one holds the payment due date.

use super::uob_account::{uob_institution, END_OF_TRANSACTIONS};
use super::{
    assemble_table, element_fragments, require, row_rules, FormatKind, ParseContext, Source,
    StatementParser,
};
use crate::columns::{label_spec, ColumnKind, ColumnSpec};
use crate::config::LayoutTuning;
use crate::error::{IngestError, Location};
use crate::layout::{Document, Element, Fragment, Page};
use crate::literal::{self, banner_text, holder_name, title_case};
use crate::record::{
    Card, CardSnapshot, CardTransaction, Holder, InstrumentSnapshot, StatementKind,
    StatementRecord,
};
use crate::rows::RowRules;
use crate::scanner::{Cue, Cursor, ElementRef, ScanRules, ScanState, TableScanner};
use chrono::{Days, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info};

static PAY_BY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Please pay by (\d{2} \w{3} \d{4})").expect("valid payment due regex")
});
static CARD_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{4}-\d{4}-\d{4}) ([\w\s]+).*$").expect("valid card header regex")
});

/// Days between statement date and payment due date.
const PAYMENT_TERM_DAYS: u64 = 21;
/// The date/currency sub-header sits this far under "Post"/"Trans".
const SUBHEADER_OFFSET: f64 = 8.0;
const SUBHEADER_TOLERANCE: f64 = 2.0;
/// Pages at the end of the statement without transactions.
const TRAILING_PAGES: usize = 2;

const SUMMARY_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::left("name", "Card Name", ColumnKind::Text),
    ColumnSpec::left("number", "Card Number", ColumnKind::Text),
    ColumnSpec::left("name_on_card", "Name on Card", ColumnKind::Text),
];

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::left("post", "Post", ColumnKind::Date),
    ColumnSpec::left("trans", "Trans", ColumnKind::Date),
    ColumnSpec::left("description", "Description of Transaction", ColumnKind::Text),
    ColumnSpec::right("amount", "Transaction Amount", ColumnKind::Amount).overhanging(),
];

pub struct UobCardParser;

impl StatementParser for UobCardParser {
    fn format(&self) -> FormatKind {
        FormatKind::UobCard
    }

    fn parse(&self, source: &Source, context: &ParseContext) -> Result<StatementRecord, IngestError> {
        let document = source.document()?;
        let location = Location::page(&document.name, 0);
        let first = require(document.first_page(), &location, "a first page")?;
        let last = require(document.last_page(), &location, "a last page")?;

        let institution = uob_institution(first, &location)?;
        let holder = card_holder(first, &location)?;
        let last_location = Location::page(&document.name, document.pages.len() - 1);
        let date = statement_date(last, &last_location)?;
        let (currency, limit) = credit_limit(first);
        info!(document = %document.name, %date, "parsing UOB card statement");

        let tuning = context.tuning(self.format());
        let (primaries, resume) = summary(document, &holder, &tuning, &location)?;

        let mut instruments: Vec<InstrumentSnapshot> = primaries
            .into_iter()
            .map(|(name, number, name_on_card)| {
                InstrumentSnapshot::card(
                    Card {
                        name,
                        number,
                        currency: currency.clone(),
                        name_on_card: Some(name_on_card),
                        parent_number: None,
                    },
                    CardSnapshot {
                        total_credit_limit: limit,
                    },
                )
            })
            .collect();

        let rules = RowRules {
            description: Some("description"),
            statement_date: Some(date),
            ..row_rules(&tuning)
        };
        let mut sections = CardSections {
            page_limit: document.pages.len().saturating_sub(TRAILING_PAGES),
            headers: Vec::new(),
            page: resume.page,
            header_seen: false,
            subheader_y: None,
        };
        let outcome = TableScanner::new(COLUMNS, tuning.column_tolerance).scan(document, resume, &mut sections)?;

        register_supplementary(&mut instruments, &sections.headers, &currency, limit);

        for table in &outcome.tables {
            let Some(InstrumentSnapshot::Card { transactions, .. }) = table
                .key
                .as_deref()
                .and_then(|key| instruments.iter_mut().find(|i| i.number() == key))
            else {
                debug!("card rows without a card header, skipped");
                continue;
            };
            for row in assemble_table(table, &rules) {
                let amount = row.amount("amount");
                transactions.push(CardTransaction {
                    date: row.date("trans"),
                    post_date: row.date("post"),
                    description: row.text("description").unwrap_or_default().to_string(),
                    sub_description: row.sub_description.clone(),
                    amount: amount.filter(|a| !a.credit).map(|a| a.value),
                    cash_rebate: amount.filter(|a| a.credit).map(|a| a.value),
                });
            }
        }

        Ok(StatementRecord {
            file_name: document.name.clone(),
            institution,
            holder,
            date,
            kind: StatementKind::Card,
            instruments,
            rejected_rows: Vec::new(),
        })
    }
}

// ============================================================================
// PAGE ONE / LAST PAGE
// ============================================================================

/// Paragraph 1: salutation and name, then address lines.
fn card_holder(first: &Page, location: &Location) -> Result<Holder, IngestError> {
    let block = require(first.paragraphs.get(1), location, "the holder paragraph")?.text();
    let mut lines = block.lines();
    let name = require(lines.next(), location, "a holder name line")?;
    let address = title_case(&lines.collect::<Vec<_>>().join(" "));

    Ok(Holder {
        full_name: holder_name(name),
        address: (!address.is_empty()).then_some(address),
    })
}

/// Three weeks before the payment due date.
fn statement_date(last: &Page, location: &Location) -> Result<NaiveDate, IngestError> {
    for element in &last.elements {
        let text = element.text();
        if let Some(captures) = PAY_BY.captures(&text) {
            let due = literal::parse_date(&captures[1])
                .ok_or_else(|| IngestError::unparseable(location.clone(), "payment due date", &captures[1]))?;
            return due
                .checked_sub_days(Days::new(PAYMENT_TERM_DAYS))
                .ok_or_else(|| IngestError::structural(location.clone(), "payment due date out of range"));
        }
    }
    Err(IngestError::structural(location.clone(), "no payment due date"))
}

/// "Total Credit Limit" row: "<CCY> <amount>" across its values.
fn credit_limit(first: &Page) -> (Option<String>, Option<Decimal>) {
    let row = first
        .elements
        .iter()
        .filter_map(Element::as_table)
        .flat_map(|t| t.rows.iter())
        .find(|r| r.label().map(str::trim) == Some("Total Credit Limit"));
    let Some(row) = row else {
        return (None, None);
    };

    let joined = row.values.iter().map(|v| v.text.as_str()).collect::<Vec<_>>().join(" ");
    let mut parts = joined.split_whitespace();
    let currency = parts.next().map(str::to_string);
    let limit = parts.next().and_then(literal::parse_decimal);
    (currency, limit)
}

// ============================================================================
// CARD SUMMARY
// ============================================================================

#[derive(Default)]
struct SummaryRules {
    opened: bool,
    /// Baseline of the summary table's last (total) row.
    end_y: Option<f64>,
}

fn element_is(element: Option<&Element>, text: &str) -> bool {
    element.is_some_and(|e| e.text() == text)
}

impl ScanRules for SummaryRules {
    fn cues<'e>(&mut self, at: ElementRef<'e>, _state: ScanState) -> Vec<Cue<'e>> {
        if at.page > 0 {
            return vec![Cue::Finish];
        }
        let element = at.element();

        if !self.opened {
            if element.text() == "Credit Card(s) Statement" && element_is(at.after(1), "Summary") {
                self.opened = true;
                return vec![Cue::Start { key: None }];
            }
            return Vec::new();
        }
        if element.text() == "Summary" && element_is(at.before(1), "Credit Card(s) Statement") {
            return Vec::new();
        }
        if self.end_y.is_some_and(|end| element.bbox().y0 < end) {
            return vec![Cue::Finish];
        }

        let fragments: Vec<&'e Fragment> = match element {
            Element::Table(table) => {
                let Some((total, body)) = table.rows.split_last() else {
                    return Vec::new();
                };
                self.end_y = Some(total.bbox.y0);
                body.iter().flat_map(|r| r.fragments()).collect()
            }
            _ => element_fragments(element),
        };

        let mut cues = Vec::new();
        let mut rows = Vec::new();
        for fragment in fragments {
            if label_spec(SUMMARY_COLUMNS, &fragment.text).is_some() {
                cues.push(Cue::Label(fragment));
            } else {
                rows.push(fragment);
            }
        }
        if !rows.is_empty() {
            cues.push(Cue::Rows(rows));
        }
        cues
    }
}

/// Primary cards as (name, number, name on card), and where the
/// transaction listing begins.
fn summary(
    document: &Document,
    holder: &Holder,
    tuning: &LayoutTuning,
    location: &Location,
) -> Result<(Vec<(String, String, String)>, Cursor), IngestError> {
    let mut summary_rules = SummaryRules::default();
    let outcome = TableScanner::new(SUMMARY_COLUMNS, tuning.column_tolerance).scan(
        document,
        Cursor::default(),
        &mut summary_rules,
    )?;

    let stopped = match outcome.stopped_at {
        Some(cursor) if cursor.page == 0 && summary_rules.opened => cursor,
        _ => return Err(IngestError::structural(location.clone(), "no card summary on the first page")),
    };

    let rules = RowRules {
        row_tolerance: tuning.row_tolerance,
        continuation_gap: tuning.summary_gap,
        ..RowRules::default()
    };

    let mut cards = Vec::new();
    for table in &outcome.tables {
        for row in assemble_table(table, &rules) {
            let row_location = location.clone().with_row(cards.len() + 1);
            let name = require(row.text("name"), &row_location, "a card name")?;
            let number = require(row.text("number"), &row_location, "a card number")?;
            let name_on_card = title_case(require(row.text("name_on_card"), &row_location, "a name on card")?);
            if !holder.full_name.contains(&name_on_card) {
                return Err(IngestError::structural(
                    row_location,
                    format!("name on card '{}' is not the holder '{}'", name_on_card, holder.full_name),
                ));
            }
            cards.push((name.to_string(), number.to_string(), name_on_card));
        }
    }

    let resume = Cursor {
        page: stopped.page,
        element: stopped.element + 1,
    };
    Ok((cards, resume))
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

struct CardHeader {
    name: String,
    number: String,
    name_on_card: String,
}

/// The column header repeats on every page; anything above it on a page
/// is letterhead and never row material.
struct CardSections {
    page_limit: usize,
    headers: Vec<CardHeader>,
    page: usize,
    header_seen: bool,
    subheader_y: Option<f64>,
}

fn card_header(element: Option<&Element>) -> Option<regex::Captures<'_>> {
    CARD_HEADER.captures(&element?.as_text()?.text)
}

impl ScanRules for CardSections {
    fn cues<'e>(&mut self, at: ElementRef<'e>, _state: ScanState) -> Vec<Cue<'e>> {
        if at.page >= self.page_limit {
            return vec![Cue::Finish];
        }
        if at.page != self.page {
            self.page = at.page;
            self.header_seen = false;
            self.subheader_y = None;
        }
        let element = at.element();

        if let Some(fragment) = element.as_text() {
            if banner_text(&fragment.text) == END_OF_TRANSACTIONS {
                return vec![Cue::Finish];
            }
            if let Some(captures) = card_header(Some(element)) {
                let number = captures[1].to_string();
                self.headers.push(CardHeader {
                    name: at.before(1).map(|e| e.text().trim().to_string()).unwrap_or_default(),
                    number: number.clone(),
                    name_on_card: title_case(captures[2].trim_end()),
                });
                return vec![Cue::Start { key: Some(number) }];
            }
            // card name line above a header
            if card_header(at.after(1)).is_some() {
                return Vec::new();
            }
        }

        let mut cues = Vec::new();
        let mut rows = Vec::new();
        for fragment in element_fragments(element) {
            if let Some(spec) = label_spec(COLUMNS, &fragment.text) {
                if matches!(spec.name, "post" | "trans") {
                    self.subheader_y = Some(fragment.y0() - SUBHEADER_OFFSET);
                }
                self.header_seen = true;
                cues.push(Cue::Label(fragment));
            } else if !self.header_seen {
                continue;
            } else if self
                .subheader_y
                .is_some_and(|y| (fragment.y0() - y).abs() <= SUBHEADER_TOLERANCE)
            {
                continue;
            } else {
                rows.push(fragment);
            }
        }
        if !rows.is_empty() {
            cues.push(Cue::Rows(rows));
        }
        cues
    }
}

/// Cards seen only in the transaction listing. The parent is the most
/// recently listed primary card with the same card name.
fn register_supplementary(
    instruments: &mut Vec<InstrumentSnapshot>,
    headers: &[CardHeader],
    currency: &Option<String>,
    limit: Option<Decimal>,
) {
    let primaries: Vec<String> = instruments.iter().map(|i| i.number().to_string()).collect();
    let mut last_primary: HashMap<&str, &str> = HashMap::new();

    for header in headers {
        if primaries.contains(&header.number) {
            last_primary.insert(&header.name, &header.number);
            continue;
        }
        if instruments.iter().any(|i| i.number() == header.number) {
            continue;
        }
        let parent = last_primary.get(header.name.as_str()).map(|n| n.to_string());
        debug!(number = %header.number, parent = ?parent, "supplementary card");
        instruments.push(InstrumentSnapshot::card(
            Card {
                name: header.name.clone(),
                number: header.number.clone(),
                currency: currency.clone(),
                name_on_card: Some(header.name_on_card.clone()),
                parent_number: parent,
            },
            CardSnapshot {
                total_credit_limit: limit,
            },
        ));
    }
}
