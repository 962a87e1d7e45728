// ⚠️ Error taxonomy for statement ingestion
//
// Field-level literal failures are recovered locally (logged, field left
// empty). Everything in IngestError surfaces to the caller.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Where in a document something went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub document: String,
    pub page: Option<usize>,
    pub row: Option<usize>,
}

impl Location {
    pub fn document(document: &str) -> Self {
        Location {
            document: document.to_string(),
            page: None,
            row: None,
        }
    }

    pub fn page(document: &str, page: usize) -> Self {
        Location {
            document: document.to_string(),
            page: Some(page),
            row: None,
        }
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.document)?;
        if let Some(page) = self.page {
            write!(f, " page {}", page)?;
        }
        if let Some(row) = self.row {
            write!(f, " row {}", row)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{location}: unrecognized statement format")]
    UnrecognizedFormat { location: Location },

    #[error("{location}: missing expected column '{column}'")]
    MissingMandatoryColumn { location: Location, column: String },

    #[error("{location}: cannot parse {field} from '{literal}'")]
    UnparseableLiteral {
        location: Location,
        field: &'static str,
        literal: String,
    },

    #[error("{location}: {message}")]
    StructuralAssertion { location: Location, message: String },

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn structural(location: Location, message: impl Into<String>) -> Self {
        IngestError::StructuralAssertion {
            location,
            message: message.into(),
        }
    }

    pub fn unparseable(location: Location, field: &'static str, literal: &str) -> Self {
        IngestError::UnparseableLiteral {
            location,
            field,
            literal: literal.to_string(),
        }
    }
}

/// A row that could not be turned into a transaction. Reported alongside
/// the record; the remaining rows are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    pub location: Location,
    pub reason: String,
}

impl fmt::Display for RejectedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let loc = Location::page("eStatement_0324", 2).with_row(7);
        assert_eq!(loc.to_string(), "eStatement_0324 page 2 row 7");
        assert_eq!(Location::document("a.csv").to_string(), "a.csv");
    }

    #[test]
    fn test_missing_column_message_names_column() {
        let err = IngestError::MissingMandatoryColumn {
            location: Location::page("doc", 0),
            column: "Balance".to_string(),
        };
        assert_eq!(err.to_string(), "doc page 0: missing expected column 'Balance'");
    }
}
