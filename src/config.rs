// ⚙️ Configuration - optional TOML file
//
//   database = "statements.db"
//
//   [holder]                      # CSV exports carry no holder details
//   name = "John Tan"
//   address = "1 Main Road Singapore 123456"
//
//   [formats.uob_card]            # per-variant layout thresholds
//   column_tolerance = 2.5
//   continuation_gap = 10.0

use crate::parser::FormatKind;
use crate::record::Holder;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "statement-ingest.toml";
pub const DEFAULT_DATABASE: &str = "statements.db";

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub holder: Option<HolderConfig>,
    #[serde(default)]
    pub formats: FormatTunings,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HolderConfig {
    pub name: String,
    pub address: Option<String>,
}

impl HolderConfig {
    pub fn to_holder(&self) -> Holder {
        Holder {
            full_name: self.name.clone(),
            address: self.address.clone(),
        }
    }
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }

    pub fn holder(&self) -> Option<Holder> {
        self.holder.as_ref().map(HolderConfig::to_holder)
    }
}

// ============================================================================
// LAYOUT THRESHOLDS
// ============================================================================

/// Coordinate thresholds used by one format variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutTuning {
    /// Max baseline difference for fragments on one line.
    pub row_tolerance: f64,
    /// Max edge distance between a value and its column header.
    pub column_tolerance: f64,
    /// Lines closer than this to the line above continue its record.
    pub continuation_gap: Option<f64>,
    /// Wrapped-row gap inside a card summary table.
    pub summary_gap: Option<f64>,
}

impl LayoutTuning {
    pub fn defaults_for(kind: FormatKind) -> Self {
        match kind {
            FormatKind::OcbcAccount | FormatKind::OcbcCard | FormatKind::UobAccount => LayoutTuning {
                row_tolerance: 3.0,
                column_tolerance: 3.0,
                continuation_gap: None,
                summary_gap: None,
            },
            FormatKind::UobCard => LayoutTuning {
                row_tolerance: 3.0,
                column_tolerance: 2.5,
                continuation_gap: Some(10.0),
                summary_gap: Some(12.0),
            },
            FormatKind::PosbAccountCsv => LayoutTuning {
                row_tolerance: 0.0,
                column_tolerance: 0.0,
                continuation_gap: None,
                summary_gap: None,
            },
        }
    }
}

/// Partial override read from `[formats.<variant>]`.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq)]
pub struct TuningOverride {
    pub row_tolerance: Option<f64>,
    pub column_tolerance: Option<f64>,
    pub continuation_gap: Option<f64>,
    pub summary_gap: Option<f64>,
}

impl TuningOverride {
    fn apply(&self, base: LayoutTuning) -> LayoutTuning {
        LayoutTuning {
            row_tolerance: self.row_tolerance.unwrap_or(base.row_tolerance),
            column_tolerance: self.column_tolerance.unwrap_or(base.column_tolerance),
            continuation_gap: self.continuation_gap.or(base.continuation_gap),
            summary_gap: self.summary_gap.or(base.summary_gap),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct FormatTunings {
    #[serde(default)]
    pub ocbc_account: TuningOverride,
    #[serde(default)]
    pub ocbc_card: TuningOverride,
    #[serde(default)]
    pub uob_account: TuningOverride,
    #[serde(default)]
    pub uob_card: TuningOverride,
    #[serde(default)]
    pub posb_account_csv: TuningOverride,
}

impl FormatTunings {
    pub fn for_format(&self, kind: FormatKind) -> LayoutTuning {
        let overrides = match kind {
            FormatKind::OcbcAccount => &self.ocbc_account,
            FormatKind::OcbcCard => &self.ocbc_card,
            FormatKind::UobAccount => &self.uob_account,
            FormatKind::UobCard => &self.uob_card,
            FormatKind::PosbAccountCsv => &self.posb_account_csv,
        };
        overrides.apply(LayoutTuning::defaults_for(kind))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file as TOML: {}", path.display()))?;
    Ok(config)
}
