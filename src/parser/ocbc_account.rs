// 🏦 OCBC account statements
//
// Page one: bank name and address (elements 0-2), holder block
// (paragraph 2), "<d Mon yyyy> TO <d Mon yyyy>" period line. Each account
// section opens with "Account No. <digits>" two elements after the
// account name; "CHECK YOUR STATEMENT" closes the transaction listing.

use super::{
    assemble_table, element_fragments, require, row_rules, FormatKind, ParseContext, Source,
    StatementParser,
};
use crate::columns::{label_spec, ColumnKind, ColumnSpec};
use crate::error::{IngestError, Location};
use crate::layout::{Document, Element, Page};
use crate::literal::{self, holder_name, title_case};
use crate::record::{
    Account, AccountSnapshot, AccountTransaction, Holder, Institution, InstrumentSnapshot,
    StatementKind, StatementRecord,
};
use crate::rows::RowRules;
use crate::scanner::{Cue, Cursor, ElementRef, ScanRules, ScanState, TableScanner};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

static PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,2} \w{3} \d{4} TO (\d{1,2} \w{3} \d{4})$").expect("valid period regex")
});
static ACCOUNT_NO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Account No\. (\d+)$").expect("valid account number regex"));

const END_OF_TRANSACTIONS: &str = "CHECK YOUR STATEMENT";

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::left("date", "Transaction Date", ColumnKind::Date),
    ColumnSpec::left("description", "Description", ColumnKind::Text),
    ColumnSpec::right("withdrawal", "Withdrawal", ColumnKind::Amount),
    ColumnSpec::right("deposit", "Deposit", ColumnKind::Amount),
    ColumnSpec::right("balance", "Balance", ColumnKind::Amount),
];

pub struct OcbcAccountParser;

impl StatementParser for OcbcAccountParser {
    fn format(&self) -> FormatKind {
        FormatKind::OcbcAccount
    }

    fn parse(&self, source: &Source, context: &ParseContext) -> Result<StatementRecord, IngestError> {
        let document = source.document()?;
        let location = Location::page(&document.name, 0);
        let first = require(document.first_page(), &location, "a first page")?;

        let institution = ocbc_institution(first, &location)?;
        let holder = ocbc_holder(first, &location)?;
        let (period_index, date) = statement_period(first, &location)?;
        info!(document = %document.name, %date, "parsing OCBC account statement");

        let tuning = context.tuning(self.format());
        let rules = RowRules {
            terminal: Some("date"),
            description: Some("description"),
            statement_date: Some(date),
            ..row_rules(&tuning)
        };

        let start = Cursor {
            page: 0,
            element: period_index.saturating_sub(1),
        };
        let instruments = transactions(document, start, tuning.column_tolerance, &rules)?;

        Ok(StatementRecord {
            file_name: document.name.clone(),
            institution,
            holder,
            date,
            kind: StatementKind::Account,
            instruments,
            rejected_rows: Vec::new(),
        })
    }
}

// ============================================================================
// PAGE ONE
// ============================================================================

/// Abbreviation and address from the first three elements; the rest of
/// the institution's details are not printed on the statement.
pub(crate) fn ocbc_institution(first: &Page, location: &Location) -> Result<Institution, IngestError> {
    let abbreviation = require(first.element_text(0), location, "the bank name element")?;
    let street = require(first.element_text(1), location, "the bank address element")?;
    let city = require(first.element_text(2), location, "the bank postal element")?;

    Ok(Institution::new(abbreviation.trim())
        .with_full_name("Oversea-Chinese Banking Corporation")
        .with_address(format!("{} {}", street.replace(',', ""), city))
        .with_registration("193200032W", "MR-8500130-7")
        .with_website("www.ocbc.com"))
}

/// Paragraph 2: name line, then address lines.
pub(crate) fn ocbc_holder(first: &Page, location: &Location) -> Result<Holder, IngestError> {
    let block = require(first.paragraphs.get(2), location, "the holder paragraph")?.text();
    let mut lines = block.lines();
    let name = require(lines.next(), location, "a holder name line")?;
    let address = lines.map(title_case).collect::<Vec<_>>().join(" ");

    Ok(Holder {
        full_name: holder_name(name),
        address: (!address.is_empty()).then_some(address),
    })
}

fn statement_period(first: &Page, location: &Location) -> Result<(usize, NaiveDate), IngestError> {
    for (index, element) in first.elements.iter().enumerate() {
        let text = element.text();
        if let Some(captures) = PERIOD.captures(&text) {
            let end = &captures[1];
            let date = literal::parse_date(end)
                .ok_or_else(|| IngestError::unparseable(location.clone(), "statement date", end))?;
            return Ok((index, date));
        }
    }
    Err(IngestError::structural(location.clone(), "no statement period line"))
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Scan rules for the account sections.
///
/// The table header repeats on every page; content above it on a page is
/// letterhead and never row material.
struct AccountSections {
    accounts: Vec<(String, String)>,
    page: usize,
    header_seen: bool,
}

fn is_account_header(element: Option<&Element>) -> bool {
    element
        .and_then(Element::as_text)
        .is_some_and(|f| ACCOUNT_NO.is_match(&f.text))
}

impl ScanRules for AccountSections {
    fn cues<'e>(&mut self, at: ElementRef<'e>, _state: ScanState) -> Vec<Cue<'e>> {
        if at.page != self.page {
            self.page = at.page;
            self.header_seen = false;
        }
        let element = at.element();

        if let Some(fragment) = element.as_text() {
            if fragment.text == END_OF_TRANSACTIONS {
                return vec![Cue::Finish];
            }
            if let Some(captures) = ACCOUNT_NO.captures(&fragment.text) {
                let number = captures[1].to_string();
                let name = at.before(2).map(Element::text).unwrap_or_default();
                self.accounts.push((name, number.clone()));
                self.header_seen = false;
                return vec![Cue::Start { key: Some(number) }];
            }
        }
        // The account name and the line under it belong to the next section.
        if is_account_header(at.after(2)) {
            return vec![Cue::End];
        }
        if is_account_header(at.after(1)) {
            return Vec::new();
        }

        let mut cues = Vec::new();
        let mut rows = Vec::new();
        for fragment in element_fragments(element) {
            if label_spec(COLUMNS, &fragment.text).is_some() {
                self.header_seen = true;
                cues.push(Cue::Label(fragment));
            } else if self.header_seen {
                rows.push(fragment);
            }
        }
        if !rows.is_empty() {
            cues.push(Cue::Rows(rows));
        }
        cues
    }
}

fn transactions(
    document: &Document,
    start: Cursor,
    tolerance: f64,
    rules: &RowRules,
) -> Result<Vec<InstrumentSnapshot>, IngestError> {
    let mut sections = AccountSections {
        accounts: Vec::new(),
        page: start.page,
        header_seen: false,
    };
    let outcome = TableScanner::new(COLUMNS, tolerance).scan(document, start, &mut sections)?;

    let mut instruments: Vec<InstrumentSnapshot> = Vec::new();
    for (name, number) in &sections.accounts {
        if instruments.iter().any(|i| i.number() == number) {
            continue;
        }
        instruments.push(InstrumentSnapshot::account(
            Account {
                name: name.clone(),
                number: number.clone(),
                currency: None,
                account_type: None,
            },
            AccountSnapshot::default(),
        ));
    }

    for table in &outcome.tables {
        let Some(key) = table.key.as_deref() else {
            debug!("transaction rows before any account header, skipped");
            continue;
        };
        let Some(InstrumentSnapshot::Account {
            snapshot,
            transactions,
            ..
        }) = instruments.iter_mut().find(|i| i.number() == key)
        else {
            continue;
        };

        for row in assemble_table(table, rules) {
            let transaction = AccountTransaction {
                date: row.date("date"),
                description: row.text("description").unwrap_or_default().to_string(),
                sub_description: row.sub_description.clone(),
                amount: row.amount("withdrawal").map(|a| a.value),
                deposits: row.amount("deposit").map(|a| a.value),
                balance: row.amount("balance").map(|a| a.value),
            };
            if transaction.balance.is_some() {
                snapshot.balance = transaction.balance;
            }
            transactions.push(transaction);
        }
    }

    Ok(instruments)
}
