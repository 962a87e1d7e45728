// 📥 Ingestion Pipeline - file → Source → StatementRecord → store
//
// One document, one SQLite transaction: detection, reconstruction and
// reconciliation either all land (with an audit event) or nothing does.

use crate::db::{insert_event, Event};
use crate::parser::{document_name, extension, parse_source, FormatKind, ParseContext, Source};
use crate::reconciliation::{reconcile, ReconcileReport};
use crate::record::StatementRecord;
use anyhow::{Context, Result};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

const ACTOR: &str = "statement-ingest";

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub format: FormatKind,
    pub record: StatementRecord,
    pub report: ReconcileReport,
    /// SHA-256 of the source bytes
    pub digest: String,
}

pub fn source_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Detect and reconstruct without touching the store.
pub fn parse_file(path: &Path, context: &ParseContext) -> Result<(FormatKind, StatementRecord)> {
    let source = Source::from_path(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed = parse_source(&source, context).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(parsed)
}

pub fn ingest_file(conn: &mut Connection, path: &Path, context: &ParseContext) -> Result<IngestOutcome> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    ingest_bytes(conn, &document_name(path), &extension(path), &bytes, context)
}

pub fn ingest_bytes(
    conn: &mut Connection,
    name: &str,
    extension: &str,
    bytes: &[u8],
    context: &ParseContext,
) -> Result<IngestOutcome> {
    let source = Source::from_bytes(name, extension, bytes).with_context(|| format!("Failed to load {}", name))?;
    let (format, record) = parse_source(&source, context).with_context(|| format!("Failed to parse {}", name))?;
    for rejected in &record.rejected_rows {
        warn!(%rejected, "row not ingested");
    }

    let digest = source_digest(bytes);
    let tx = conn.transaction()?;
    let report = reconcile(&*tx, &record).with_context(|| format!("Failed to store {}", name))?;

    let event = Event::new(
        "statement_ingested",
        "statement",
        &report.statement_id.to_string(),
        serde_json::json!({
            "file_name": record.file_name,
            "format": format.code(),
            "sha256": digest,
            "created": report.created(),
            "existing": report.existing(),
            "rejected_rows": record.rejected_rows.len(),
        }),
        ACTOR,
    );
    insert_event(&tx, &event)?;
    tx.commit()?;

    info!(document = name, format = format.code(), created = report.created(), "statement ingested");
    Ok(IngestOutcome {
        format,
        record,
        report,
        digest,
    })
}
