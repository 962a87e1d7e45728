// Statement Ingest - Core Library
// Layout reconstruction and record assembly for bank statements

pub mod columns;        // Coordinate alignment: header labels → column bands
pub mod config;         // TOML configuration and per-format thresholds
pub mod db;             // Natural-key store on SQLite
pub mod error;
pub mod ingest;         // File → record → store, one transaction per document
pub mod layout;         // Positioned fragments from the extraction step
pub mod literal;        // Dates, amounts and names as printed
pub mod parser;         // Format detection and per-issuer reconstruction
pub mod reconciliation; // StatementRecord → persisted entities
pub mod record;
pub mod rows;           // Row assembly and continuation merging
pub mod scanner;        // Table scanning state machine

// Re-export commonly used types
pub use columns::{Anchor, ColumnKind, ColumnLayout, ColumnSpec, LayoutError};
pub use config::{load_config, Config, LayoutTuning, DEFAULT_CONFIG_FILE};
pub use db::{
    get_events_for_entity, insert_event, open_database, setup_database, EntityKind, Event,
    RecordStore, Upserted,
};
pub use error::{IngestError, Location, RejectedRow};
pub use ingest::{ingest_bytes, ingest_file, parse_file, IngestOutcome};
pub use layout::{BBox, Document, Element, Fragment, Page};
pub use parser::{
    detect_format, get_parser, parse_source, FormatKind, ParseContext, Source, StatementParser,
};
pub use reconciliation::{reconcile, ReconcileReport, Tally};
pub use record::{
    Account, AccountSnapshot, AccountTransaction, Card, CardSnapshot, CardTransaction, Holder,
    Institution, InstrumentSnapshot, StatementKind, StatementRecord,
};
pub use rows::{LogicalRow, RowRules};
pub use scanner::{ScanState, TableScanner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
