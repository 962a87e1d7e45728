use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use statement_ingest::{
    detect_format, ingest_file, load_config, open_database, parse_file, Config, Holder,
    ParseContext, Source, DEFAULT_CONFIG_FILE,
};

#[derive(Parser)]
#[command(name = "statement-ingest", version, about = "Reconstruct bank statements into a SQLite ledger")]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse statements and reconcile them into the database
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Database path (overrides the config file)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Holder name for exports that do not print one
        #[arg(long)]
        holder: Option<String>,

        #[arg(long, requires = "holder")]
        holder_address: Option<String>,
    },
    /// Print the detected statement format
    Identify { file: PathBuf },
    /// Print the reconstructed statement as JSON
    Show {
        file: PathBuf,

        #[arg(long)]
        holder: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Ingest {
            files,
            db,
            holder,
            holder_address,
        } => {
            let holder = holder.map(|full_name| Holder {
                full_name,
                address: holder_address,
            });
            run_ingest(&config, &files, db, holder)
        }
        Command::Identify { file } => run_identify(&file),
        Command::Show { file, holder } => {
            let holder = holder.map(|full_name| Holder {
                full_name,
                address: None,
            });
            run_show(&config, &file, holder)
        }
    }
}

fn context(config: &Config, holder: Option<Holder>) -> ParseContext {
    ParseContext {
        holder: holder.or_else(|| config.holder()),
        tunings: config.formats.clone(),
    }
}

fn run_ingest(config: &Config, files: &[PathBuf], db: Option<PathBuf>, holder: Option<Holder>) -> Result<()> {
    println!("📥 Statement ingestion");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = db.unwrap_or_else(|| config.database_path());
    let mut conn = open_database(&db_path)?;
    println!("✓ Database ready: {}", db_path.display());

    let context = context(config, holder);
    let mut failed = 0;

    for file in files {
        println!("\n📄 {}", file.display());
        match ingest_file(&mut conn, file, &context) {
            Ok(outcome) => {
                println!("✓ Format: {}", outcome.format);
                println!(
                    "✓ {} instrument(s), {} transaction(s)",
                    outcome.record.instruments.len(),
                    outcome.record.transaction_count()
                );
                println!("✓ {}", outcome.report.summary());
                for rejected in &outcome.record.rejected_rows {
                    println!("⚠️  Rejected: {}", rejected);
                }
            }
            Err(err) => {
                failed += 1;
                eprintln!("❌ {:#}", err);
            }
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ {} ingested, {} failed", files.len() - failed, failed);
    if failed > 0 {
        bail!("{} document(s) failed", failed);
    }
    Ok(())
}

fn run_identify(file: &Path) -> Result<()> {
    let source = Source::from_path(file)?;
    let format = detect_format(&source)?;
    println!("{}: {} ({})", file.display(), format, format.code());
    Ok(())
}

fn run_show(config: &Config, file: &Path, holder: Option<Holder>) -> Result<()> {
    let (format, record) = parse_file(file, &context(config, holder))?;
    eprintln!("🔍 {}", format);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
