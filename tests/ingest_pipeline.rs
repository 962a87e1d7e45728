// End-to-end: files on disk → detection → reconstruction → SQLite.

use rusqlite::Connection;
use statement_ingest::{
    ingest_file, open_database, BBox, Document, Element, EntityKind, FormatKind, Fragment, Holder,
    InstrumentSnapshot, Page, ParseContext, RecordStore, StatementKind,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn text(t: &str, x0: f64, x1: f64, y: f64) -> Element {
    Element::Text(Fragment::new(t, BBox::new(x0, y, x1, y + 8.0)))
}

fn paragraph(lines: &[&str], x0: f64, top: f64) -> Element {
    let lines: Vec<Fragment> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let y = top - 10.0 * i as f64;
            Fragment::new(*l, BBox::new(x0, y, x0 + 200.0, y + 8.0))
        })
        .collect();
    let bbox = lines
        .iter()
        .map(|l| l.bbox)
        .reduce(|a, b| a.union(&b))
        .unwrap();
    Element::Paragraph(statement_ingest::layout::Paragraph { bbox, lines })
}

fn ocbc_account_statement() -> Document {
    let mut first = vec![
        text("OCBC", 10.0, 60.0, 820.0),
        text("65 Chulia Street, OCBC Centre", 10.0, 200.0, 810.0),
        text("Singapore 049513", 10.0, 120.0, 800.0),
    ];
    first.extend((0..6).map(|i| text(&format!("notice {}", i), 10.0, 60.0, 790.0 - i as f64 * 10.0)));
    first.extend(vec![
        text("STATEMENT OF ACCOUNT", 200.0, 340.0, 720.0),
        text("1 MAR 2024 TO 31 MAR 2024", 200.0, 340.0, 710.0),
        text("360 ACCOUNT", 40.0, 120.0, 690.0),
        text("Currency: SGD", 40.0, 120.0, 680.0),
        text("Account No. 601234567001", 40.0, 200.0, 670.0),
        text("Transaction Date", 40.0, 110.0, 650.0),
        text("Description", 150.0, 210.0, 650.0),
        text("Withdrawal", 330.0, 380.0, 650.0),
        text("Deposit", 420.0, 460.0, 650.0),
        text("Balance", 500.0, 540.0, 650.0),
        text("01 MAR", 40.0, 75.0, 630.0),
        text("BALANCE B/F", 150.0, 220.0, 630.0),
        text("1,000.00", 500.0, 540.0, 630.0),
        text("02 MAR", 40.0, 75.0, 615.0),
        text("NETS QR", 150.0, 200.0, 615.0),
        text("20.00", 350.0, 380.0, 615.0),
        text("980.00", 510.0, 540.0, 615.0),
        text("KOPITIAM", 150.0, 200.0, 605.0),
        text("CHECK YOUR STATEMENT", 40.0, 200.0, 560.0),
    ]);

    Document {
        name: String::new(),
        pages: vec![Page {
            elements: first,
            paragraphs: vec![
                paragraph(&["OCBC"], 10.0, 820.0),
                paragraph(&["Statement"], 10.0, 800.0),
                paragraph(&["MR JOHN TAN", "BLK 123 ANG MO KIO AVE 3"], 10.0, 760.0),
            ],
        }],
    }
}

const POSB_EXPORT: &str = "\
Account Details For:,POSB Passbook Savings Savings Account 123-45678-9
Statement as at:,31 Mar 2024
Available Balance:,\"1,234.56\"
Ledger Balance:,\"1,234.56\"
Transaction Date,Reference,Debit Amount,Credit Amount,Transaction Ref1,Transaction Ref2,Transaction Ref3
02 Mar 2024,POS,12.30,,NETS PURCHASE,FAIRPRICE,
05 Mar 2024,ICT,,\"1,000.00\",FUNDS TRANSFER,FROM SAVINGS,REF 881
";

fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn store(dir: &Path) -> Connection {
    open_database(&dir.join("statements.db")).unwrap()
}

fn posb_context() -> ParseContext {
    ParseContext {
        holder: Some(Holder {
            full_name: "John Tan".to_string(),
            address: None,
        }),
        ..ParseContext::default()
    }
}

#[test]
fn test_ocbc_account_json_end_to_end() {
    let dir = TempDir::new().unwrap();
    let json = serde_json::to_vec(&ocbc_account_statement()).unwrap();
    let path = write(dir.path(), "ocbc_0324.json", &json);
    let mut conn = store(dir.path());

    let outcome = ingest_file(&mut conn, &path, &ParseContext::default()).unwrap();

    assert_eq!(outcome.format, FormatKind::OcbcAccount);
    assert_eq!(outcome.record.kind, StatementKind::Account);
    // document name falls back to the file stem
    assert_eq!(outcome.record.file_name, "ocbc_0324");

    let (date, kind): (String, String) = conn
        .query_row("SELECT date, type FROM statements", [], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    assert_eq!(date, "2024-03-31");
    assert_eq!(kind, "ACCOUNT");
    assert_eq!(conn.count(EntityKind::AccountTransaction).unwrap(), 2);
}

#[test]
fn test_posb_csv_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "posb_0324.csv", POSB_EXPORT.as_bytes());
    let mut conn = store(dir.path());

    let outcome = ingest_file(&mut conn, &path, &posb_context()).unwrap();
    assert_eq!(outcome.format, FormatKind::PosbAccountCsv);

    let InstrumentSnapshot::Account { snapshot, .. } = &outcome.record.instruments[0] else {
        panic!("expected an account");
    };
    assert_eq!(snapshot.balance, Some("1234.56".parse().unwrap()));

    let balance: String = conn
        .query_row("SELECT balance FROM account_snapshots", [], |row| row.get(0))
        .unwrap();
    assert_eq!(balance, "1234.56");

    let sub_description: String = conn
        .query_row(
            "SELECT sub_description FROM account_transactions WHERE row_number = 2",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(sub_description, "FROM SAVINGS\nREF 881");
}

#[test]
fn test_reingesting_same_files_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let json = serde_json::to_vec(&ocbc_account_statement()).unwrap();
    let ocbc = write(dir.path(), "ocbc_0324.json", &json);
    let posb = write(dir.path(), "posb_0324.csv", POSB_EXPORT.as_bytes());
    let mut conn = store(dir.path());

    let first_ocbc = ingest_file(&mut conn, &ocbc, &posb_context()).unwrap();
    let first_posb = ingest_file(&mut conn, &posb, &posb_context()).unwrap();
    let second_ocbc = ingest_file(&mut conn, &ocbc, &posb_context()).unwrap();
    let second_posb = ingest_file(&mut conn, &posb, &posb_context()).unwrap();

    assert!(first_ocbc.report.created() > 0);
    assert!(first_posb.report.created() > 0);
    assert_eq!(second_ocbc.report.created(), 0);
    assert_eq!(second_posb.report.created(), 0);
    assert_eq!(second_posb.report.existing(), first_posb.report.created());

    // same holder name, different address: two holders
    assert_eq!(conn.count(EntityKind::Holder).unwrap(), 2);
    assert_eq!(conn.count(EntityKind::AccountTransaction).unwrap(), 4);

    let events: i64 = conn
        .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
        .unwrap();
    assert_eq!(events, 4);
}

#[test]
fn test_unrecognized_document_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut document = ocbc_account_statement();
    document.pages[0].elements[0] = text("SOME OTHER BANK", 10.0, 60.0, 820.0);
    let path = write(dir.path(), "other.json", &serde_json::to_vec(&document).unwrap());
    let mut conn = store(dir.path());

    let err = ingest_file(&mut conn, &path, &ParseContext::default()).unwrap_err();
    assert!(format!("{:#}", err).contains("unrecognized statement format"));
    assert_eq!(conn.count(EntityKind::Statement).unwrap(), 0);
}
