// 🏦 UOB account statements
//
// Page one carries the account overview: each category label appears twice
// in the paragraph view, the second time followed by the category's
// balance table and one detail paragraph (type / name / number) per
// account. Detail paragraphs join their table row by vertical position.
//
// Transaction tables follow "End of Summary", one table per account page,
// each headed by the account number; "End of Transaction Details" closes
// the listing. The last page is never part of it.

use super::{
    assemble_table, element_fragments, layout_error, require, row_rules, FormatKind, ParseContext,
    Source, StatementParser,
};
use crate::columns::{label_spec, ColumnKind, ColumnLayout, ColumnSpec};
use crate::error::{IngestError, Location};
use crate::layout::{BBox, Document, Element, Fragment, Page, Table};
use crate::literal::{self, banner_text, holder_name, title_case};
use crate::record::{
    Account, AccountSnapshot, AccountTransaction, Holder, Institution, InstrumentSnapshot,
    StatementKind, StatementRecord,
};
use crate::rows::RowRules;
use crate::scanner::{Cue, Cursor, ElementRef, ScanRules, ScanState, TableScanner};
use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info};

static OVERVIEW_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Account Overview as at (\d{2} \w{3} \d{4})").expect("valid overview regex")
});
static ACCOUNT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\d-]+).*$").expect("valid account number regex"));

pub(crate) const END_OF_SUMMARY: &str = "End of Summary";
pub(crate) const END_OF_TRANSACTIONS: &str = "End of Transaction Details";

/// First paragraph index holding a category label.
const FIRST_CATEGORY: usize = 4;

const OVERVIEW_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::left("currency", "Currency", ColumnKind::Text),
    ColumnSpec::right("credit_line", "Credit Line", ColumnKind::Amount).optional(),
];

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::left("date", "Date", ColumnKind::Date),
    ColumnSpec::left("description", "Description", ColumnKind::Text),
    ColumnSpec::right("withdrawals", "Withdrawals", ColumnKind::Amount),
    ColumnSpec::right("deposits", "Deposits", ColumnKind::Amount),
    ColumnSpec::right("balance", "Balance", ColumnKind::Amount),
];

pub struct UobAccountParser;

impl StatementParser for UobAccountParser {
    fn format(&self) -> FormatKind {
        FormatKind::UobAccount
    }

    fn parse(&self, source: &Source, context: &ParseContext) -> Result<StatementRecord, IngestError> {
        let document = source.document()?;
        let location = Location::page(&document.name, 0);
        let first = require(document.first_page(), &location, "a first page")?;

        let institution = uob_institution(first, &location)?;
        let holder = account_holder(first, &location)?;
        let date = overview_date(first, &location)?;
        info!(document = %document.name, %date, "parsing UOB account statement");

        let tuning = context.tuning(self.format());
        let mut instruments = overview(first, &location, tuning.column_tolerance, tuning.row_tolerance)?;

        let rules = RowRules {
            terminal: Some("balance"),
            description: Some("description"),
            statement_date: Some(date),
            ..row_rules(&tuning)
        };
        transactions(document, &mut instruments, tuning.column_tolerance, &rules)?;

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

/// The first page's trailing line: full name • address • Co. Reg. No. •
/// GST Reg. No. • e-mail.
pub(crate) fn uob_institution(first: &Page, location: &Location) -> Result<Institution, IngestError> {
    let footer = require(first.elements.last(), location, "the bank footer line")?.text();
    let parts: Vec<&str> = footer.split(" • ").map(str::trim).collect();
    let [full_name, address, company, gst, email, ..] = parts.as_slice() else {
        return Err(IngestError::structural(
            location.clone(),
            format!("bank footer has {} parts, expected 5", parts.len()),
        ));
    };

    Ok(Institution::new("UOB")
        .with_full_name(*full_name)
        .with_address(*address)
        .with_registration(
            company.trim_start_matches("Co. Reg. No. "),
            gst.trim_start_matches("GST Reg. No. "),
        )
        .with_email(*email))
}

/// Element 0 is the name line; the address is element 2 plus, per row of
/// the element 3 table, the first cell that is not the "Call" label.
fn account_holder(first: &Page, location: &Location) -> Result<Holder, IngestError> {
    let name = require(first.element_text(0), location, "the holder name element")?;
    let mut address = require(first.element_text(2), location, "the holder address element")?;
    let contact = require(
        first.elements.get(3).and_then(Element::as_table),
        location,
        "the holder contact table",
    )?;
    for row in &contact.rows {
        if let Some(cell) = row.cells.iter().find(|c| c.text != "Call") {
            address.push(' ');
            address.push_str(&cell.text);
        }
    }

    Ok(Holder {
        full_name: holder_name(&name),
        address: Some(title_case(&address)),
    })
}

fn overview_date(first: &Page, location: &Location) -> Result<NaiveDate, IngestError> {
    let text = require(first.paragraphs.get(3), location, "the overview paragraph")?.text();
    let captures = OVERVIEW_DATE
        .captures(&text)
        .ok_or_else(|| IngestError::structural(location.clone(), "no account overview date"))?;
    literal::parse_date(&captures[1])
        .ok_or_else(|| IngestError::unparseable(location.clone(), "statement date", &captures[1]))
}

/// One body row of a category table.
struct OverviewRow {
    y: f64,
    currency: String,
    credit_line: Option<Decimal>,
    balance: Option<Decimal>,
}

fn category_rows(table: &Table, location: &Location, tolerance: f64) -> Result<Vec<OverviewRow>, IngestError> {
    let header = require(table.rows.first(), location, "a category table header")?;
    let labels: Vec<&Fragment> = header.fragments().collect();
    let layout = ColumnLayout::resolve(&labels, OVERVIEW_COLUMNS, tolerance)
        .map_err(|err| layout_error(location, err))?;

    let mut rows = Vec::new();
    for row in &table.rows[1..] {
        let mut currency = None;
        let mut credit_line = None;
        for cell in &row.cells {
            match layout.classify(cell).map(|band| band.name) {
                Some("currency") => currency = Some(cell.text.trim().to_string()),
                Some("credit_line") => credit_line = literal::parse_decimal(&cell.text),
                _ => {}
            }
        }
        let Some(currency) = currency else {
            debug!(y = row.bbox.y0, "category row without a currency, skipped");
            continue;
        };
        rows.push(OverviewRow {
            y: row.bbox.y0,
            currency,
            credit_line,
            balance: row.values.first().and_then(|v| literal::parse_decimal(&v.text)),
        });
    }
    Ok(rows)
}

/// Accounts and their balances from the overview.
fn overview(
    first: &Page,
    location: &Location,
    column_tolerance: f64,
    row_tolerance: f64,
) -> Result<Vec<InstrumentSnapshot>, IngestError> {
    let paragraphs = &first.paragraphs;
    let mut open_categories: HashSet<String> = HashSet::new();
    let mut instruments = Vec::new();
    let mut i = FIRST_CATEGORY;

    while i < paragraphs.len() {
        let label = paragraphs[i].text();
        if open_categories.insert(label.clone()) {
            i += 1;
            continue;
        }
        open_categories.remove(&label);

        let table = require(
            paragraphs.get(i + 1).and_then(Element::as_table),
            location,
            "a balance table after the category label",
        )?;
        let mut rows = category_rows(table, location, column_tolerance)?;
        let count = rows.len();

        for j in 0..count {
            let detail = require(
                paragraphs.get(i + 2 + j).and_then(Element::as_paragraph),
                location,
                "an account detail paragraph",
            )?;
            let [account_type, name, number] = detail.lines.as_slice() else {
                return Err(IngestError::structural(
                    location.clone(),
                    format!("account detail has {} lines, expected 3", detail.lines.len()),
                ));
            };
            let position = rows
                .iter()
                .position(|r| (r.y - name.y0()).abs() < row_tolerance)
                .ok_or_else(|| {
                    IngestError::structural(
                        location.clone(),
                        format!("no balance row beside account {}", number.text),
                    )
                })?;
            let row = rows.remove(position);

            instruments.push(InstrumentSnapshot::account(
                Account {
                    name: name.text.trim().to_string(),
                    number: number.text.trim().to_string(),
                    currency: Some(row.currency),
                    account_type: Some(account_type.text.trim().to_string()),
                },
                AccountSnapshot {
                    balance: row.balance,
                    credit_line: row.credit_line,
                },
            ));
        }

        i += 2 + count;
        if open_categories.is_empty() {
            break;
        }
    }

    Ok(instruments)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

struct TransactionTables<'a> {
    known_numbers: Vec<&'a str>,
    page_limit: usize,
    past_summary: bool,
    /// Bounds of the last table seen on the current page.
    last_table: Option<(usize, BBox)>,
}

impl ScanRules for TransactionTables<'_> {
    fn cues<'e>(&mut self, at: ElementRef<'e>, _state: ScanState) -> Vec<Cue<'e>> {
        if at.page >= self.page_limit {
            return vec![Cue::Finish];
        }
        let element = at.element();

        if let Some(fragment) = element.as_text() {
            match banner_text(&fragment.text) {
                END_OF_SUMMARY => {
                    self.past_summary = true;
                    return Vec::new();
                }
                END_OF_TRANSACTIONS => return vec![Cue::Finish],
                _ => {}
            }
        }
        if !self.past_summary {
            return Vec::new();
        }

        match element {
            Element::Table(table) => {
                self.last_table = Some((at.page, table.bbox));
                let mut cues = vec![Cue::Start { key: None }];
                let mut rows = Vec::new();
                for fragment in table.fragments() {
                    if let Some(number) = self.account_number(&fragment.text) {
                        cues.push(Cue::Key(number));
                    } else if label_spec(COLUMNS, &fragment.text).is_some() {
                        cues.push(Cue::Label(fragment));
                    } else {
                        rows.push(fragment);
                    }
                }
                cues.push(Cue::Rows(rows));
                cues
            }
            _ => match self.last_table {
                Some((page, bbox)) if page == at.page && bbox.spans(&element.bbox()) => {
                    vec![Cue::Rows(element_fragments(element))]
                }
                _ => Vec::new(),
            },
        }
    }
}

impl TransactionTables<'_> {
    fn account_number(&self, text: &str) -> Option<String> {
        let captures = ACCOUNT_NUMBER.captures(text)?;
        let number = &captures[1];
        self.known_numbers
            .iter()
            .any(|known| *known == number)
            .then(|| number.to_string())
    }
}

fn transactions(
    document: &Document,
    instruments: &mut [InstrumentSnapshot],
    tolerance: f64,
    rules: &RowRules,
) -> Result<(), IngestError> {
    let numbers: Vec<String> = instruments.iter().map(|i| i.number().to_string()).collect();
    let mut tables = TransactionTables {
        known_numbers: numbers.iter().map(String::as_str).collect(),
        page_limit: document.pages.len().saturating_sub(1),
        past_summary: false,
        last_table: None,
    };
    let outcome = TableScanner::new(COLUMNS, tolerance).scan(document, Cursor::default(), &mut tables)?;

    for table in &outcome.tables {
        let Some(key) = table.key.as_deref() else {
            let page = table.segments.first().map(|s| s.page).unwrap_or_default();
            return Err(IngestError::structural(
                Location::page(&document.name, page),
                "transaction table without an account number",
            ));
        };
        let Some(InstrumentSnapshot::Account { transactions, .. }) =
            instruments.iter_mut().find(|i| i.number() == key)
        else {
            continue;
        };

        for row in assemble_table(table, rules) {
            transactions.push(AccountTransaction {
                date: row.date("date"),
                description: row.text("description").unwrap_or_default().to_string(),
                sub_description: row.sub_description.clone(),
                amount: row.amount("withdrawals").map(|a| a.value),
                deposits: row.amount("deposits").map(|a| a.value),
                balance: row.amount("balance").map(|a| a.value),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fixtures::*;
    use crate::parser::parse_source;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    const FOOTER: &str = "United Overseas Bank Limited • 80 Raffles Place UOB Plaza Singapore 048624 • Co. Reg. No. 193500026Z • GST Reg. No. MR-8500194-3 • www.uob.com.sg";

    fn first_page() -> crate::layout::Page {
        let elements = vec![
            text("MR JOHN TAN", 40.0, 140.0, 780.0),
            text("Statement of Account", 300.0, 420.0, 780.0),
            text("BLK 123 ANG MO KIO AVE 3", 40.0, 200.0, 770.0),
            table(vec![
                row(vec![frag("Call", 40.0, 60.0, 760.0), frag("#05-67", 70.0, 110.0, 760.0)], Vec::new()),
                row(vec![frag("SINGAPORE 560123", 40.0, 140.0, 750.0)], Vec::new()),
            ]),
            text(FOOTER, 10.0, 580.0, 20.0),
        ];

        let paragraphs = vec![
            paragraph(&["MR JOHN TAN"], 40.0, 780.0),
            paragraph(&["BLK 123"], 40.0, 770.0),
            paragraph(&["Statement of Account"], 300.0, 780.0),
            paragraph(&["Account Overview as at 31 Mar 2024"], 40.0, 700.0),
            paragraph(&["Deposits"], 40.0, 680.0),
            paragraph(&["Deposits"], 40.0, 660.0),
            table(vec![
                row(
                    vec![frag("Currency", 300.0, 340.0, 650.0), frag("Credit Line", 400.0, 450.0, 650.0)],
                    vec![frag("Balance", 500.0, 540.0, 650.0)],
                ),
                row(
                    vec![frag("SGD", 300.0, 320.0, 630.0), frag("0.00", 430.0, 450.0, 630.0)],
                    vec![frag("5,210.33", 500.0, 540.0, 630.0)],
                ),
                row(
                    vec![frag("SGD", 300.0, 320.0, 600.0)],
                    vec![frag("12,000.00", 495.0, 540.0, 600.0)],
                ),
            ]),
            Element::Paragraph(crate::layout::Paragraph {
                bbox: BBox::new(40.0, 610.0, 200.0, 640.0),
                lines: vec![
                    frag("Savings", 40.0, 80.0, 640.0),
                    frag("One Account", 40.0, 100.0, 630.0),
                    frag("123-456-789-0", 40.0, 110.0, 620.0),
                ],
            }),
            Element::Paragraph(crate::layout::Paragraph {
                bbox: BBox::new(40.0, 580.0, 200.0, 610.0),
                lines: vec![
                    frag("Fixed Deposit", 40.0, 100.0, 610.0),
                    frag("SGD Fixed Deposit", 40.0, 120.0, 600.0),
                    frag("987-654-321-0", 40.0, 110.0, 590.0),
                ],
            }),
        ];
        page(elements, paragraphs)
    }

    fn transaction_page() -> crate::layout::Page {
        page(
            vec![
                text("----- End of Summary -----", 100.0, 500.0, 800.0),
                table(vec![
                    row(vec![frag("123-456-789-0 One Account", 40.0, 200.0, 760.0)], Vec::new()),
                    row(
                        vec![frag("Date", 40.0, 60.0, 740.0), frag("Description", 100.0, 160.0, 740.0)],
                        vec![
                            frag("Withdrawals", 300.0, 350.0, 740.0),
                            frag("Deposits", 390.0, 430.0, 740.0),
                            frag("Balance", 490.0, 540.0, 740.0),
                        ],
                    ),
                    row(
                        vec![frag("01 Mar", 40.0, 65.0, 720.0), frag("BALANCE B/F", 100.0, 160.0, 720.0)],
                        vec![frag("5,000.00", 500.0, 540.0, 720.0)],
                    ),
                    row(
                        vec![frag("04 Mar", 40.0, 65.0, 700.0), frag("Inward Credit-FAST", 100.0, 190.0, 700.0)],
                        vec![frag("210.33", 400.0, 430.0, 700.0), frag("5,210.33", 500.0, 540.0, 700.0)],
                    ),
                ]),
                text("PAYNOW FROM ALEX", 100.0, 190.0, 690.0),
                text("outside the table", 10.0, 600.0, 680.0),
                text("----- End of Transaction Details -----", 100.0, 500.0, 600.0),
            ],
            Vec::new(),
        )
    }

    fn statement() -> Document {
        Document {
            name: "uob_0324".to_string(),
            pages: vec![
                first_page(),
                transaction_page(),
                page(vec![text("Important notes", 10.0, 100.0, 800.0)], Vec::new()),
            ],
        }
    }

    #[test]
    fn test_institution_from_footer() {
        let institution = uob_institution(&first_page(), &Location::page("doc", 0)).unwrap();
        assert_eq!(institution.full_name.as_deref(), Some("United Overseas Bank Limited"));
        assert_eq!(institution.company_registration_number.as_deref(), Some("193500026Z"));
        assert_eq!(institution.gst_registration_number.as_deref(), Some("MR-8500194-3"));
        assert_eq!(institution.email.as_deref(), Some("www.uob.com.sg"));
    }

    #[test]
    fn test_overview_joins_details_by_position() {
        let (kind, record) = parse_source(&Source::Pages(statement()), &ParseContext::default()).unwrap();
        assert_eq!(kind, FormatKind::UobAccount);
        assert_eq!(record.holder.full_name, "John Tan");
        assert_eq!(
            record.holder.address.as_deref(),
            Some("Blk 123 Ang Mo Kio Ave 3 #05-67 Singapore 560123")
        );
        assert_eq!(record.instruments.len(), 2);

        let InstrumentSnapshot::Account { account, snapshot, .. } = &record.instruments[0] else {
            panic!("expected an account");
        };
        assert_eq!(account.number, "123-456-789-0");
        assert_eq!(account.account_type.as_deref(), Some("Savings"));
        assert_eq!(account.currency.as_deref(), Some("SGD"));
        assert_eq!(snapshot.balance, Some(dec("5210.33")));
        assert_eq!(snapshot.credit_line, Some(dec("0.00")));

        let InstrumentSnapshot::Account { account, snapshot, .. } = &record.instruments[1] else {
            panic!("expected an account");
        };
        assert_eq!(account.name, "SGD Fixed Deposit");
        assert_eq!(snapshot.balance, Some(dec("12000.00")));
        assert_eq!(snapshot.credit_line, None);
    }

    #[test]
    fn test_transactions_follow_end_of_summary() {
        let record = UobAccountParser
            .parse(&Source::Pages(statement()), &ParseContext::default())
            .unwrap();

        let InstrumentSnapshot::Account { transactions, .. } = &record.instruments[0] else {
            panic!("expected an account");
        };
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].description, "BALANCE B/F");
        assert_eq!(transactions[1].deposits, Some(dec("210.33")));
        assert_eq!(transactions[1].sub_description, vec!["PAYNOW FROM ALEX".to_string()]);
        assert_eq!(record.instrument("987-654-321-0").unwrap().transaction_count(), 0);
    }

    #[test]
    fn test_short_footer_is_structural() {
        let mut page = first_page();
        page.elements[4] = text("United Overseas Bank Limited • 80 Raffles Place", 10.0, 300.0, 20.0);
        let err = uob_institution(&page, &Location::page("doc", 0)).unwrap_err();
        assert!(matches!(err, IngestError::StructuralAssertion { .. }));
    }
}
