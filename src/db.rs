// 🗄️ Statement Store - natural-key upserts on SQLite + WAL
//
// Every entity is found by its natural key or created with the given
// defaults. An existing row is never updated (first write wins).
// Polymorphic references are explicit (kind tag, id) pairs.

use crate::error::IngestError;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// ENTITY REGISTRY
// ============================================================================

/// Every persisted entity kind, resolved once and passed around by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Address,
    Institution,
    Holder,
    Statement,
    Account,
    Card,
    InstrumentStatement,
    AccountSnapshot,
    CardSnapshot,
    AccountTransaction,
    CardTransaction,
}

impl EntityKind {
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Address,
        EntityKind::Institution,
        EntityKind::Holder,
        EntityKind::Statement,
        EntityKind::Account,
        EntityKind::Card,
        EntityKind::InstrumentStatement,
        EntityKind::AccountSnapshot,
        EntityKind::CardSnapshot,
        EntityKind::AccountTransaction,
        EntityKind::CardTransaction,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Address => "addresses",
            EntityKind::Institution => "institutions",
            EntityKind::Holder => "holders",
            EntityKind::Statement => "statements",
            EntityKind::Account => "accounts",
            EntityKind::Card => "cards",
            EntityKind::InstrumentStatement => "instrument_statements",
            EntityKind::AccountSnapshot => "account_snapshots",
            EntityKind::CardSnapshot => "card_snapshots",
            EntityKind::AccountTransaction => "account_transactions",
            EntityKind::CardTransaction => "card_transactions",
        }
    }

    /// Tag stored in (kind, id) reference columns.
    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::Address => "address",
            EntityKind::Institution => "institution",
            EntityKind::Holder => "holder",
            EntityKind::Statement => "statement",
            EntityKind::Account => "account",
            EntityKind::Card => "card",
            EntityKind::InstrumentStatement => "instrument_statement",
            EntityKind::AccountSnapshot => "account_snapshot",
            EntityKind::CardSnapshot => "card_snapshot",
            EntityKind::AccountTransaction => "account_transaction",
            EntityKind::CardTransaction => "card_transaction",
        }
    }
}

// ============================================================================
// FIELD VALUES
// ============================================================================

/// One column of a natural key or of the defaults.
pub type Field = (&'static str, Value);

pub fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::Text(v.to_string()))
}

/// Decimals are stored as their exact text form.
pub fn decimal(value: Option<Decimal>) -> Value {
    value.map_or(Value::Null, |v| Value::Text(v.to_string()))
}

pub fn date(value: Option<NaiveDate>) -> Value {
    value.map_or(Value::Null, |v| Value::Text(v.format("%Y-%m-%d").to_string()))
}

pub fn id(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

// ============================================================================
// RECORD STORE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    pub id: i64,
    pub created: bool,
}

/// Upsert-by-natural-key persistence.
///
/// Implementations must make a lookup followed by an insert safe for their
/// own concurrent writers; reconciliation does not coordinate this.
pub trait RecordStore {
    fn find_or_create(&self, kind: EntityKind, key: &[Field], defaults: &[Field]) -> Result<Upserted, IngestError>;

    fn count(&self, kind: EntityKind) -> Result<i64, IngestError>;
}

impl RecordStore for Connection {
    fn find_or_create(&self, kind: EntityKind, key: &[Field], defaults: &[Field]) -> Result<Upserted, IngestError> {
        let table = kind.table();

        // IS rather than = so NULL key parts match.
        let filter = key
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} IS ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let found: Option<i64> = self
            .query_row(
                &format!("SELECT id FROM {} WHERE {}", table, filter),
                params_from_iter(key.iter().map(|(_, v)| v)),
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = found {
            return Ok(Upserted { id, created: false });
        }

        let fields: Vec<&Field> = key.iter().chain(defaults.iter()).collect();
        let columns = fields.iter().map(|(c, _)| *c).collect::<Vec<_>>().join(", ");
        let placeholders = (1..=fields.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ");
        self.execute(
            &format!("INSERT INTO {} ({}) VALUES ({})", table, columns, placeholders),
            params_from_iter(fields.iter().map(|(_, v)| v)),
        )?;

        Ok(Upserted {
            id: self.last_insert_rowid(),
            created: true,
        })
    }

    fn count(&self, kind: EntityKind) -> Result<i64, IngestError> {
        let count = self.query_row(&format!("SELECT COUNT(*) FROM {}", kind.table()), [], |row| row.get(0))?;
        Ok(count)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_address TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS institutions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT,
            abbreviation TEXT NOT NULL,
            address_id INTEGER REFERENCES addresses(id),
            company_registration_number TEXT,
            gst_registration_number TEXT,
            website TEXT,
            email TEXT,
            UNIQUE (full_name, abbreviation)
        );

        CREATE TABLE IF NOT EXISTS holders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            address_id INTEGER REFERENCES addresses(id),
            UNIQUE (full_name, address_id)
        );

        CREATE TABLE IF NOT EXISTS statements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            holder_id INTEGER NOT NULL REFERENCES holders(id),
            provider_id INTEGER NOT NULL REFERENCES institutions(id),
            date TEXT NOT NULL,
            type TEXT NOT NULL,
            file_name TEXT,
            UNIQUE (holder_id, provider_id, date, type)
        );

        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            holder_id INTEGER NOT NULL REFERENCES holders(id),
            provider_id INTEGER NOT NULL REFERENCES institutions(id),
            name TEXT NOT NULL,
            number TEXT NOT NULL,
            currency TEXT,
            type TEXT,
            UNIQUE (holder_id, provider_id, name, number, currency, type)
        );

        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            holder_id INTEGER NOT NULL REFERENCES holders(id),
            provider_id INTEGER NOT NULL REFERENCES institutions(id),
            name TEXT NOT NULL,
            number TEXT NOT NULL,
            currency TEXT,
            name_on_card TEXT,
            parent_id INTEGER REFERENCES cards(id),
            UNIQUE (holder_id, provider_id, name, number, currency)
        );

        CREATE TABLE IF NOT EXISTS instrument_statements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instrument_kind TEXT NOT NULL,
            instrument_id INTEGER NOT NULL,
            statement_id INTEGER NOT NULL REFERENCES statements(id),
            UNIQUE (instrument_kind, instrument_id, statement_id)
        );

        CREATE TABLE IF NOT EXISTS account_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instrument_statement_id INTEGER NOT NULL UNIQUE REFERENCES instrument_statements(id),
            balance TEXT,
            credit_line TEXT
        );

        CREATE TABLE IF NOT EXISTS card_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instrument_statement_id INTEGER NOT NULL UNIQUE REFERENCES instrument_statements(id),
            total_credit_limit TEXT
        );

        CREATE TABLE IF NOT EXISTS account_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_kind TEXT NOT NULL,
            snapshot_id INTEGER NOT NULL,
            row_number INTEGER NOT NULL,
            date TEXT,
            description TEXT NOT NULL,
            sub_description TEXT NOT NULL,
            amount TEXT,
            deposits TEXT,
            balance TEXT,
            UNIQUE (snapshot_kind, snapshot_id, row_number)
        );

        CREATE TABLE IF NOT EXISTS card_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_kind TEXT NOT NULL,
            snapshot_id INTEGER NOT NULL,
            row_number INTEGER NOT NULL,
            date TEXT,
            post_date TEXT,
            description TEXT NOT NULL,
            sub_description TEXT NOT NULL,
            amount TEXT,
            cash_rebate TEXT,
            UNIQUE (snapshot_kind, snapshot_id, row_number)
        );",
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_statements_file ON statements(file_name)",
        [],
    )?;

    Ok(())
}

/// Open (or create) the database file and make sure the schema exists.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
