// 🏦 POSB account CSV exports
//
// No positions to reconstruct: fixed cells instead.
//   row 1, cell 2  "<BANK> <account name> <type> Account <number>"
//   row 2, cell 2  statement date
//   row 3, cell 2  balance
//   row 6..        date, (unused), debit, credit, description, extra lines...
// The export carries no holder; it comes from the parse context.

use super::{FormatKind, ParseContext, Source, StatementParser};
use crate::error::{IngestError, Location, RejectedRow};
use crate::literal;
use crate::record::{
    Account, AccountSnapshot, AccountTransaction, Institution, InstrumentSnapshot, StatementKind,
    StatementRecord,
};
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static ACCOUNT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+) ([\w\s]+?) (\w+) Account ([\d-]+)$").expect("valid account line regex")
});

const FIRST_TRANSACTION_ROW: usize = 5;
const CURRENCY: &str = "SGD";

pub struct PosbCsvParser;

fn cell<'r>(rows: &'r [Vec<String>], row: usize, column: usize) -> Option<&'r str> {
    rows.get(row)?.get(column).map(|c| c.trim())
}

fn optional_decimal(text: Option<&str>, field: &str) -> Option<Decimal> {
    let text = text.filter(|t| !t.is_empty())?;
    let value = literal::parse_decimal(text);
    if value.is_none() {
        debug!(field, literal = text, "amount does not parse");
    }
    value
}

impl StatementParser for PosbCsvParser {
    fn format(&self) -> FormatKind {
        FormatKind::PosbAccountCsv
    }

    fn parse(&self, source: &Source, context: &ParseContext) -> Result<StatementRecord, IngestError> {
        let Source::Csv { name, rows } = source else {
            return Err(IngestError::UnrecognizedFormat {
                location: Location::document(source.name()),
            });
        };
        let location = Location::document(name);

        let account_line = cell(rows, 0, 1).unwrap_or_default();
        let captures = ACCOUNT_LINE.captures(account_line).ok_or_else(|| {
            IngestError::structural(location.clone().with_row(1), format!("unexpected account line '{}'", account_line))
        })?;

        let date_literal = cell(rows, 1, 1).unwrap_or_default();
        let date = literal::parse_date(date_literal)
            .ok_or_else(|| IngestError::unparseable(location.clone().with_row(2), "statement date", date_literal))?;
        let balance = optional_decimal(cell(rows, 2, 1), "balance");

        let holder = context.holder.clone().ok_or_else(|| {
            IngestError::structural(location.clone(), "CSV export carries no holder; configure one")
        })?;
        info!(document = %name, %date, "parsing POSB account export");

        let account = Account {
            name: captures[2].to_string(),
            number: captures[4].to_string(),
            currency: Some(CURRENCY.to_string()),
            account_type: Some(captures[3].to_string()),
        };
        let mut snapshot = InstrumentSnapshot::account(
            account,
            AccountSnapshot {
                balance,
                credit_line: Some(Decimal::ZERO),
            },
        );

        let mut rejected_rows = Vec::new();
        if let InstrumentSnapshot::Account { transactions, .. } = &mut snapshot {
            for (index, row) in rows.iter().enumerate().skip(FIRST_TRANSACTION_ROW) {
                if row.iter().all(|c| c.trim().is_empty()) {
                    continue;
                }
                let row_location = location.clone().with_row(index + 1);
                let date_literal = row.first().map(|c| c.trim()).unwrap_or_default();
                let Some(date) = literal::parse_date(date_literal) else {
                    let rejected = RejectedRow {
                        location: row_location,
                        reason: format!("unparseable transaction date '{}'", date_literal),
                    };
                    warn!(%rejected, "row rejected");
                    rejected_rows.push(rejected);
                    continue;
                };

                let text = |column: usize| row.get(column).map(|c| c.trim());
                transactions.push(AccountTransaction {
                    date: Some(date),
                    description: text(4).unwrap_or_default().to_string(),
                    sub_description: row
                        .iter()
                        .skip(5)
                        .map(|c| c.trim())
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect(),
                    amount: optional_decimal(text(2), "debit"),
                    deposits: optional_decimal(text(3), "credit"),
                    balance: None,
                });
            }
        }

        Ok(StatementRecord {
            file_name: name.clone(),
            institution: Institution::new(&captures[1]),
            holder,
            date,
            kind: StatementKind::Account,
            instruments: vec![snapshot],
            rejected_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::record::Holder;
    use chrono::NaiveDate;

    fn csv_source(lines: &[&[&str]]) -> Source {
        Source::Csv {
            name: "posb_0324".to_string(),
            rows: lines
                .iter()
                .map(|l| l.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn export() -> Source {
        csv_source(&[
            &["Account Details For:", "POSB Passbook Savings Savings Account 123-45678-9"],
            &["Statement as at:", "31 Mar 2024"],
            &["Available Balance:", "1,234.56"],
            &["Ledger Balance:", "1,234.56"],
            &["Transaction Date", "Reference", "Debit Amount", "Credit Amount", "Transaction Ref1", "Transaction Ref2"],
            &["02 Mar 2024", "POS", "12.30", "", "NETS PURCHASE", "FAIRPRICE", ""],
            &["", "", "", "", ""],
            &["05 Mar 2024", "ICT", "", "1,000.00", "FUNDS TRANSFER", "FROM SAVINGS", "REF 881"],
            &["Total", "", "12.30", "1,000.00", ""],
        ])
    }

    fn context() -> ParseContext {
        ParseContext {
            holder: Some(Holder {
                full_name: "John Tan".to_string(),
                address: None,
            }),
            ..ParseContext::default()
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_posb_cell_routes_to_csv_parser() {
        let (kind, record) = parse_source(&export(), &context()).unwrap();
        assert_eq!(kind, FormatKind::PosbAccountCsv);
        assert_eq!(record.institution.abbreviation, "POSB");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn test_account_and_balance() {
        let record = PosbCsvParser.parse(&export(), &context()).unwrap();
        let InstrumentSnapshot::Account { account, snapshot, transactions } = &record.instruments[0] else {
            panic!("expected an account");
        };
        assert_eq!(account.name, "Passbook Savings");
        assert_eq!(account.account_type.as_deref(), Some("Savings"));
        assert_eq!(account.number, "123-45678-9");
        assert_eq!(snapshot.balance, Some(dec("1234.56")));
        assert_eq!(snapshot.credit_line, Some(Decimal::ZERO));

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].amount, Some(dec("12.30")));
        assert_eq!(transactions[0].deposits, None);
        assert_eq!(transactions[0].sub_description, vec!["FAIRPRICE".to_string()]);
        assert_eq!(transactions[1].deposits, Some(dec("1000.00")));
        assert_eq!(
            transactions[1].sub_description,
            vec!["FROM SAVINGS".to_string(), "REF 881".to_string()]
        );
    }

    #[test]
    fn test_unparseable_row_date_is_rejected_not_fatal() {
        let record = PosbCsvParser.parse(&export(), &context()).unwrap();
        assert_eq!(record.rejected_rows.len(), 1);
        assert_eq!(record.rejected_rows[0].location.row, Some(9));
    }

    #[test]
    fn test_missing_holder_is_structural() {
        let err = PosbCsvParser.parse(&export(), &ParseContext::default()).unwrap_err();
        assert!(matches!(err, IngestError::StructuralAssertion { .. }));
    }

    #[test]
    fn test_bad_statement_date_is_fatal() {
        let source = csv_source(&[
            &["Account Details For:", "POSB Everyday Savings Savings Account 111-22222-3"],
            &["Statement as at:", "sometime"],
        ]);
        let err = PosbCsvParser.parse(&source, &context()).unwrap_err();
        assert!(matches!(err, IngestError::UnparseableLiteral { field: "statement date", .. }));
    }
}
