// ⚖️ Record Reconciliation - StatementRecord → persisted entities
//
// Dependency order:
//   address → institution → holder → statement → instrument
//   → instrument-statement link → snapshot → transactions
//
// Each entity is looked up by its natural key and created only when
// absent. A transaction's identity is (snapshot, row_number), where
// row_number is its 1-based position in the instrument's listing, so
// re-ingesting an unchanged document creates nothing.

use crate::db::{date, decimal, id, text, EntityKind, Field, RecordStore, Upserted};
use crate::error::IngestError;
use crate::record::{
    Account, AccountSnapshot, AccountTransaction, Card, CardSnapshot, CardTransaction, Holder,
    Institution, InstrumentSnapshot, StatementRecord,
};
use rusqlite::types::Value;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub created: usize,
    pub existing: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub statement_id: i64,
    pub tallies: HashMap<EntityKind, Tally>,
}

impl ReconcileReport {
    fn record(&mut self, kind: EntityKind, upserted: Upserted) -> i64 {
        let tally = self.tallies.entry(kind).or_default();
        if upserted.created {
            tally.created += 1;
        } else {
            tally.existing += 1;
        }
        upserted.id
    }

    pub fn tally(&self, kind: EntityKind) -> Tally {
        self.tallies.get(&kind).copied().unwrap_or_default()
    }

    pub fn created(&self) -> usize {
        self.tallies.values().map(|t| t.created).sum()
    }

    pub fn existing(&self) -> usize {
        self.tallies.values().map(|t| t.existing).sum()
    }

    pub fn summary(&self) -> String {
        let parts: Vec<String> = EntityKind::ALL
            .iter()
            .filter_map(|kind| {
                let tally = self.tally(*kind);
                (tally.created > 0).then(|| format!("{} {}", tally.created, kind.table()))
            })
            .collect();
        if parts.is_empty() {
            format!("nothing new ({} existing)", self.existing())
        } else {
            format!("created {} ({} existing)", parts.join(", "), self.existing())
        }
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

struct Reconciler<'s, S: RecordStore + ?Sized> {
    store: &'s S,
    report: ReconcileReport,
}

impl<S: RecordStore + ?Sized> Reconciler<'_, S> {
    fn upsert(&mut self, kind: EntityKind, key: &[Field], defaults: &[Field]) -> Result<i64, IngestError> {
        let upserted = self.store.find_or_create(kind, key, defaults)?;
        Ok(self.report.record(kind, upserted))
    }

    fn address(&mut self, address: Option<&str>) -> Result<Option<i64>, IngestError> {
        match address.filter(|a| !a.is_empty()) {
            Some(address) => self
                .upsert(EntityKind::Address, &[("full_address", text(Some(address)))], &[])
                .map(Some),
            None => Ok(None),
        }
    }

    fn institution(&mut self, institution: &Institution) -> Result<i64, IngestError> {
        let address_id = self.address(institution.address.as_deref())?;
        self.upsert(
            EntityKind::Institution,
            &[
                ("full_name", text(institution.full_name.as_deref())),
                ("abbreviation", text(Some(institution.abbreviation.as_str()))),
            ],
            &[
                ("address_id", id(address_id)),
                ("company_registration_number", text(institution.company_registration_number.as_deref())),
                ("gst_registration_number", text(institution.gst_registration_number.as_deref())),
                ("website", text(institution.website.as_deref())),
                ("email", text(institution.email.as_deref())),
            ],
        )
    }

    fn holder(&mut self, holder: &Holder) -> Result<i64, IngestError> {
        let address_id = self.address(holder.address.as_deref())?;
        self.upsert(
            EntityKind::Holder,
            &[("full_name", text(Some(holder.full_name.as_str()))), ("address_id", id(address_id))],
            &[],
        )
    }

    fn account(&mut self, owner: &[Field; 2], account: &Account) -> Result<i64, IngestError> {
        let [holder, provider] = owner.clone();
        self.upsert(
            EntityKind::Account,
            &[
                holder,
                provider,
                ("name", text(Some(account.name.as_str()))),
                ("number", text(Some(account.number.as_str()))),
                ("currency", text(account.currency.as_deref())),
                ("type", text(account.account_type.as_deref())),
            ],
            &[],
        )
    }

    fn card(&mut self, owner: &[Field; 2], card: &Card, parent_id: Option<i64>) -> Result<i64, IngestError> {
        let [holder, provider] = owner.clone();
        self.upsert(
            EntityKind::Card,
            &[
                holder,
                provider,
                ("name", text(Some(card.name.as_str()))),
                ("number", text(Some(card.number.as_str()))),
                ("currency", text(card.currency.as_deref())),
            ],
            &[("name_on_card", text(card.name_on_card.as_deref())), ("parent_id", id(parent_id))],
        )
    }

    fn link(&mut self, instrument: EntityKind, instrument_id: i64, statement_id: i64) -> Result<i64, IngestError> {
        self.upsert(
            EntityKind::InstrumentStatement,
            &[
                ("instrument_kind", text(Some(instrument.tag()))),
                ("instrument_id", id(Some(instrument_id))),
                ("statement_id", id(Some(statement_id))),
            ],
            &[],
        )
    }

    fn account_snapshot(&mut self, link_id: i64, snapshot: &AccountSnapshot) -> Result<i64, IngestError> {
        self.upsert(
            EntityKind::AccountSnapshot,
            &[("instrument_statement_id", id(Some(link_id)))],
            &[("balance", decimal(snapshot.balance)), ("credit_line", decimal(snapshot.credit_line))],
        )
    }

    fn card_snapshot(&mut self, link_id: i64, snapshot: &CardSnapshot) -> Result<i64, IngestError> {
        self.upsert(
            EntityKind::CardSnapshot,
            &[("instrument_statement_id", id(Some(link_id)))],
            &[("total_credit_limit", decimal(snapshot.total_credit_limit))],
        )
    }

    fn account_transactions(&mut self, snapshot_id: i64, transactions: &[AccountTransaction]) -> Result<(), IngestError> {
        for (index, transaction) in transactions.iter().enumerate() {
            self.upsert(
                EntityKind::AccountTransaction,
                &transaction_key(EntityKind::AccountSnapshot, snapshot_id, index),
                &[
                    ("date", date(transaction.date)),
                    ("description", text(Some(transaction.description.as_str()))),
                    ("sub_description", Value::Text(transaction.sub_description.join("\n"))),
                    ("amount", decimal(transaction.amount)),
                    ("deposits", decimal(transaction.deposits)),
                    ("balance", decimal(transaction.balance)),
                ],
            )?;
        }
        Ok(())
    }

    fn card_transactions(&mut self, snapshot_id: i64, transactions: &[CardTransaction]) -> Result<(), IngestError> {
        for (index, transaction) in transactions.iter().enumerate() {
            self.upsert(
                EntityKind::CardTransaction,
                &transaction_key(EntityKind::CardSnapshot, snapshot_id, index),
                &[
                    ("date", date(transaction.date)),
                    ("post_date", date(transaction.post_date)),
                    ("description", text(Some(transaction.description.as_str()))),
                    ("sub_description", Value::Text(transaction.sub_description.join("\n"))),
                    ("amount", decimal(transaction.amount)),
                    ("cash_rebate", decimal(transaction.cash_rebate)),
                ],
            )?;
        }
        Ok(())
    }
}

fn transaction_key(snapshot: EntityKind, snapshot_id: i64, index: usize) -> [Field; 3] {
    [
        ("snapshot_kind", text(Some(snapshot.tag()))),
        ("snapshot_id", id(Some(snapshot_id))),
        // 1-based position in the listing
        ("row_number", Value::Integer(index as i64 + 1)),
    ]
}

/// Persist one statement record. Run it inside a store transaction when
/// partial results must not survive a failure.
pub fn reconcile<S: RecordStore + ?Sized>(store: &S, record: &StatementRecord) -> Result<ReconcileReport, IngestError> {
    let mut reconciler = Reconciler {
        store,
        report: ReconcileReport::default(),
    };

    let provider_id = reconciler.institution(&record.institution)?;
    let holder_id = reconciler.holder(&record.holder)?;
    let statement_id = reconciler.upsert(
        EntityKind::Statement,
        &[
            ("holder_id", id(Some(holder_id))),
            ("provider_id", id(Some(provider_id))),
            ("date", date(Some(record.date))),
            ("type", text(Some(record.kind.as_str()))),
        ],
        &[("file_name", text(Some(record.file_name.as_str())))],
    )?;
    reconciler.report.statement_id = statement_id;

    let owner: [Field; 2] = [("holder_id", id(Some(holder_id))), ("provider_id", id(Some(provider_id)))];
    let mut card_ids: HashMap<&str, i64> = HashMap::new();

    for instrument in &record.instruments {
        match instrument {
            InstrumentSnapshot::Account {
                account,
                snapshot,
                transactions,
            } => {
                let account_id = reconciler.account(&owner, account)?;
                let link_id = reconciler.link(EntityKind::Account, account_id, statement_id)?;
                let snapshot_id = reconciler.account_snapshot(link_id, snapshot)?;
                reconciler.account_transactions(snapshot_id, transactions)?;
            }
            InstrumentSnapshot::Card {
                card,
                snapshot,
                transactions,
            } => {
                let parent_id = card.parent_number.as_deref().and_then(|number| {
                    let parent = card_ids.get(number).copied();
                    if parent.is_none() {
                        debug!(card = %card.number, parent = number, "parent card not in this statement");
                    }
                    parent
                });
                let card_id = reconciler.card(&owner, card, parent_id)?;
                card_ids.insert(&card.number, card_id);

                let link_id = reconciler.link(EntityKind::Card, card_id, statement_id)?;
                let snapshot_id = reconciler.card_snapshot(link_id, snapshot)?;
                reconciler.card_transactions(snapshot_id, transactions)?;
            }
        }
    }

    Ok(reconciler.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::record::StatementKind;
    use chrono::NaiveDate;
    use rusqlite::Connection;

    fn store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn card(number: &str, parent: Option<&str>) -> Card {
        Card {
            name: "UOB ONE CARD".to_string(),
            number: number.to_string(),
            currency: Some("SGD".to_string()),
            name_on_card: Some("John Tan".to_string()),
            parent_number: parent.map(str::to_string),
        }
    }

    fn card_statement() -> StatementRecord {
        let mut primary = InstrumentSnapshot::card(card("4532-0000-1111-2222", None), CardSnapshot::default());
        if let InstrumentSnapshot::Card { transactions, .. } = &mut primary {
            transactions.push(CardTransaction {
                date: NaiveDate::from_ymd_opt(2024, 3, 1),
                description: "NTUC FAIRPRICE".to_string(),
                sub_description: vec!["SINGAPORE".to_string()],
                amount: Some("45.20".parse().unwrap()),
                ..CardTransaction::default()
            });
            transactions.push(CardTransaction {
                date: NaiveDate::from_ymd_opt(2024, 3, 5),
                description: "PAYMENT REBATE".to_string(),
                cash_rebate: Some("120.50".parse().unwrap()),
                ..CardTransaction::default()
            });
        }
        let supplementary = InstrumentSnapshot::card(
            card("4532-1111-2222-3333", Some("4532-0000-1111-2222")),
            CardSnapshot::default(),
        );

        StatementRecord {
            file_name: "uob_card_0324".to_string(),
            institution: Institution::new("UOB").with_full_name("United Overseas Bank Limited"),
            holder: Holder {
                full_name: "John Tan".to_string(),
                address: Some("1 Clementi Road".to_string()),
            },
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            kind: StatementKind::Card,
            instruments: vec![primary, supplementary],
            rejected_rows: Vec::new(),
        }
    }

    #[test]
    fn test_reconcile_creates_every_entity() {
        let conn = store();
        let report = reconcile(&conn, &card_statement()).unwrap();

        assert_eq!(report.tally(EntityKind::Card).created, 2);
        assert_eq!(report.tally(EntityKind::CardSnapshot).created, 2);
        assert_eq!(report.tally(EntityKind::CardTransaction).created, 2);
        // holder address only; the institution has none
        assert_eq!(report.tally(EntityKind::Address).created, 1);
        assert_eq!(report.existing(), 0);
    }

    #[test]
    fn test_reingest_creates_nothing() {
        let conn = store();
        let first = reconcile(&conn, &card_statement()).unwrap();
        let second = reconcile(&conn, &card_statement()).unwrap();

        assert_eq!(second.created(), 0);
        assert_eq!(second.existing(), first.created());
        assert_eq!(second.statement_id, first.statement_id);
        assert_eq!(conn.count(EntityKind::CardTransaction).unwrap(), 2);
    }

    #[test]
    fn test_row_numbers_follow_listing_order() {
        let conn = store();
        reconcile(&conn, &card_statement()).unwrap();

        let rows: Vec<(i64, String)> = conn
            .prepare("SELECT row_number, description FROM card_transactions ORDER BY row_number")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![(1, "NTUC FAIRPRICE".to_string()), (2, "PAYMENT REBATE".to_string())]);
    }

    #[test]
    fn test_supplementary_card_links_parent() {
        let conn = store();
        reconcile(&conn, &card_statement()).unwrap();

        let (parent_number,): (String,) = conn
            .query_row(
                "SELECT p.number FROM cards c JOIN cards p ON c.parent_id = p.id WHERE c.number = ?1",
                ["4532-1111-2222-3333"],
                |row| Ok((row.get(0)?,)),
            )
            .unwrap();
        assert_eq!(parent_number, "4532-0000-1111-2222");
    }

    #[test]
    fn test_summary_lists_created_tables() {
        let conn = store();
        let report = reconcile(&conn, &card_statement()).unwrap();
        assert!(report.summary().contains("2 cards"));
        let again = reconcile(&conn, &card_statement()).unwrap();
        assert!(again.summary().starts_with("nothing new"));
    }
}
