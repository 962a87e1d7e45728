// 💳 OCBC card statements
//
// Shares the letterhead and holder block with the account statement.
// "Statement Date <date>" and "Total Credit Limit <CCY> <amount>" sit on
// page one; each card section opens with "<CARD NAME> <card number>" and
// the listing ends at "TOTAL AMOUNT DUE".

use super::ocbc_account::{ocbc_holder, ocbc_institution};
use super::{
    assemble_table, element_fragments, require, row_rules, FormatKind, ParseContext, Source,
    StatementParser,
};
use crate::columns::{label_spec, ColumnKind, ColumnSpec};
use crate::error::{IngestError, Location};
use crate::layout::Page;
use crate::literal;
use crate::record::{
    Card, CardSnapshot, CardTransaction, InstrumentSnapshot, StatementKind, StatementRecord,
};
use crate::rows::RowRules;
use crate::scanner::{Cue, Cursor, ElementRef, ScanRules, ScanState, TableScanner};
use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::LazyLock;
use tracing::{debug, info};

static STATEMENT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Statement Date (\d{1,2} \w{3} \d{4})$").expect("valid statement date regex")
});
static CREDIT_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Total Credit Limit ([A-Z]{3}) ([\d,]+(?:\.\d+)?)$").expect("valid credit limit regex")
});
static CARD_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+) (\d{4}-\d{4}-\d{4}-\d{4})$").expect("valid card header regex")
});

const END_OF_TRANSACTIONS: &str = "TOTAL AMOUNT DUE";

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::left("date", "Date", ColumnKind::Date),
    ColumnSpec::left("description", "Description", ColumnKind::Text),
    ColumnSpec::right("amount", "Amount (SGD)", ColumnKind::Amount).overhanging(),
];

pub struct OcbcCardParser;

impl StatementParser for OcbcCardParser {
    fn format(&self) -> FormatKind {
        FormatKind::OcbcCard
    }

    fn parse(&self, source: &Source, context: &ParseContext) -> Result<StatementRecord, IngestError> {
        let document = source.document()?;
        let location = Location::page(&document.name, 0);
        let first = require(document.first_page(), &location, "a first page")?;

        let institution = ocbc_institution(first, &location)?;
        let holder = ocbc_holder(first, &location)?;
        let date = statement_date(first, &location)?;
        let (currency, limit) = credit_limit(first);
        info!(document = %document.name, %date, "parsing OCBC card statement");

        let tuning = context.tuning(self.format());
        let rules = RowRules {
            terminal: Some("date"),
            description: Some("description"),
            statement_date: Some(date),
            ..row_rules(&tuning)
        };

        let mut sections = CardSections {
            cards: Vec::new(),
            page: 0,
            header_seen: false,
        };
        let outcome = TableScanner::new(COLUMNS, tuning.column_tolerance).scan(
            document,
            Cursor::default(),
            &mut sections,
        )?;

        let mut instruments: Vec<InstrumentSnapshot> = Vec::new();
        for (name, number) in sections.cards {
            if instruments.iter().any(|i| i.number() == number) {
                continue;
            }
            instruments.push(InstrumentSnapshot::card(
                Card {
                    name,
                    number,
                    currency: currency.clone(),
                    name_on_card: None,
                    parent_number: None,
                },
                CardSnapshot {
                    total_credit_limit: limit,
                },
            ));
        }

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
                    date: row.date("date"),
                    post_date: None,
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

fn statement_date(first: &Page, location: &Location) -> Result<NaiveDate, IngestError> {
    for element in &first.elements {
        let text = element.text();
        if let Some(captures) = STATEMENT_DATE.captures(&text) {
            let literal = &captures[1];
            return literal::parse_date(literal)
                .ok_or_else(|| IngestError::unparseable(location.clone(), "statement date", literal));
        }
    }
    Err(IngestError::structural(location.clone(), "no statement date line"))
}

fn credit_limit(first: &Page) -> (Option<String>, Option<Decimal>) {
    first
        .elements
        .iter()
        .find_map(|element| {
            let text = element.text();
            CREDIT_LIMIT
                .captures(&text)
                .map(|c| (Some(c[1].to_string()), literal::parse_decimal(&c[2])))
        })
        .unwrap_or((None, None))
}

struct CardSections {
    cards: Vec<(String, String)>,
    page: usize,
    header_seen: bool,
}

impl ScanRules for CardSections {
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
            if let Some(captures) = CARD_HEADER.captures(&fragment.text) {
                let number = captures[2].to_string();
                self.cards.push((captures[1].trim().to_string(), number.clone()));
                return vec![Cue::Start { key: Some(number) }];
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Document, Element};
    use crate::parser::fixtures::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn header(y: f64) -> Vec<Element> {
        vec![
            text("Date", 40.0, 60.0, y),
            text("Description", 120.0, 180.0, y),
            text("Amount (SGD)", 480.0, 540.0, y),
        ]
    }

    fn statement() -> Document {
        let mut first = vec![
            text("OCBC", 10.0, 60.0, 820.0),
            text("65 Chulia Street, OCBC Centre", 10.0, 200.0, 810.0),
            text("Singapore 049513", 10.0, 120.0, 800.0),
            text("Statement Date 15 Jan 2024", 300.0, 450.0, 790.0),
            text("Total Credit Limit SGD 12,000", 300.0, 450.0, 780.0),
            text("365 CREDIT CARD 5555-1111-2222-3333", 40.0, 260.0, 700.0),
        ];
        first.extend(header(680.0));
        first.extend(vec![
            text("28 DEC", 40.0, 70.0, 660.0),
            text("COLD STORAGE", 120.0, 190.0, 660.0),
            text("45.10", 510.0, 540.0, 660.0),
            text("03 JAN", 40.0, 70.0, 640.0),
            text("PAYMENT - THANK YOU", 120.0, 230.0, 640.0),
            text("500.00 CR", 495.0, 552.0, 640.0),
            text("TOTAL AMOUNT DUE", 40.0, 140.0, 600.0),
        ]);
        let last = vec![
            text("Only requests from Principal Cardmembers are accepted.", 10.0, 400.0, 60.0),
            text("Page 1", 10.0, 60.0, 40.0),
            text("Footer", 10.0, 60.0, 20.0),
        ];

        Document {
            name: "ocbc_card_0124".to_string(),
            pages: vec![
                page(
                    first,
                    vec![
                        paragraph(&["OCBC"], 10.0, 820.0),
                        paragraph(&["Statement"], 10.0, 800.0),
                        paragraph(&["MS JANE LIM", "8 ORCHARD ROAD"], 10.0, 760.0),
                    ],
                ),
                page(last, Vec::new()),
            ],
        }
    }

    #[test]
    fn test_card_statement_transactions() {
        let source = Source::Pages(statement());
        assert_eq!(crate::parser::detect_format(&source).unwrap(), FormatKind::OcbcCard);

        let record = OcbcCardParser.parse(&source, &ParseContext::default()).unwrap();
        assert_eq!(record.kind, StatementKind::Card);
        assert_eq!(record.holder.full_name, "Jane Lim");

        let InstrumentSnapshot::Card {
            card,
            snapshot,
            transactions,
        } = &record.instruments[0]
        else {
            panic!("expected a card");
        };
        assert_eq!(card.name, "365 CREDIT CARD");
        assert_eq!(card.currency.as_deref(), Some("SGD"));
        assert_eq!(snapshot.total_credit_limit, Some(dec("12000")));

        assert_eq!(transactions.len(), 2);
        // December row on a January statement belongs to the previous year
        assert_eq!(transactions[0].date, NaiveDate::from_ymd_opt(2023, 12, 28));
        assert_eq!(transactions[0].amount, Some(dec("45.10")));
        assert_eq!(transactions[1].cash_rebate, Some(dec("500.00")));
        assert_eq!(transactions[1].amount, None);
    }
}
