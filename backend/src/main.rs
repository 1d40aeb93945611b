//! SpendScore CLI - normalize transaction CSVs and compute a SpendScore
//!
//! # Main Commands
//!
//! ```bash
//! spendscore serve                    # Start HTTP server (port 3000)
//! spendscore analyze export.csv       # Full analysis: score, breakdown, suggestions
//! spendscore report list              # Manage stored reports
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! spendscore columns export.csv       # Show detected column mapping
//! spendscore normalize export.csv     # Canonical transactions as JSON
//! spendscore score transactions.json  # Score already-normalized transactions
//! spendscore tier 82                  # Tier for a score
//! ```

use clap::{Parser, Subcommand};
use spendscore::{
    analyze_file, normalize::normalize_table, parse_file, AnalysisOptions, CanonicalField,
    ColumnMapping, FileReportRepository, HeaderMatcher, MatchKind, ReportRepository, Settings,
    SpendScoreEngine, StoredReport, TierInfo, Transaction,
};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "spendscore")]
#[command(about = "Normalize transaction CSV exports and compute a SpendScore", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how each canonical field resolves against a CSV's headers
    Columns {
        /// Input CSV file
        input: PathBuf,
    },

    /// Normalize a CSV into canonical transactions (JSON)
    Normalize {
        /// Input CSV file
        input: PathBuf,

        /// Explicit column, e.g. --map amount="Paid Out" (repeatable)
        #[arg(short, long = "map", value_parser = parse_mapping_arg)]
        mappings: Vec<(CanonicalField, String)>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score a JSON array of transactions
    Score {
        /// Input JSON file
        input: PathBuf,
    },

    /// Full analysis: CSV -> transactions -> SpendScore -> suggestions
    Analyze {
        /// Input CSV file
        input: PathBuf,

        /// Explicit column, e.g. --map amount="Paid Out" (repeatable)
        #[arg(short, long = "map", value_parser = parse_mapping_arg)]
        mappings: Vec<(CanonicalField, String)>,

        /// Ask the AI provider for suggestions (needs ANTHROPIC_API_KEY)
        #[arg(long)]
        insights: bool,

        /// Store the result as a report
        #[arg(long)]
        save: bool,

        /// Company name recorded with a saved report
        #[arg(long)]
        company: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the tier for a score
    Tier {
        /// Score between 0 and 100
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        score: u8,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: SPENDSCORE_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage stored reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    /// List all stored reports
    List,

    /// Show a stored report
    Show {
        /// Report ID
        id: Uuid,
    },

    /// Delete a stored report
    Delete {
        /// Report ID
        id: Uuid,
    },
}

fn parse_mapping_arg(raw: &str) -> Result<(CanonicalField, String), String> {
    let (field, header) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=HEADER, got '{}'", raw))?;
    let field = CanonicalField::from_name(field.trim())
        .ok_or_else(|| format!("unknown field '{}'", field.trim()))?;
    Ok((field, header.trim().to_string()))
}

fn mapping_from(pairs: Vec<(CanonicalField, String)>) -> Option<ColumnMapping> {
    let mapping = pairs
        .into_iter()
        .fold(ColumnMapping::new(), |m, (field, header)| m.with(field, header));
    (!mapping.is_empty()).then_some(mapping)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match Settings::from_env() {
        Ok(settings) => run(cli.command, settings).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, settings: Settings) -> CliResult {
    match command {
        Commands::Columns { input } => cmd_columns(&input),
        Commands::Normalize { input, mappings, output } => {
            cmd_normalize(&input, mapping_from(mappings), output.as_deref())
        }
        Commands::Score { input } => cmd_score(&input),
        Commands::Analyze {
            input,
            mappings,
            insights,
            save,
            company,
            output,
        } => {
            let mut options = if insights {
                AnalysisOptions::from_settings(&settings)
            } else {
                AnalysisOptions {
                    min_transactions: settings.min_transactions,
                    ..AnalysisOptions::default()
                }
            };
            options = options.with_mapping(mapping_from(mappings));
            let repo = if save {
                Some(FileReportRepository::open(&settings.data_dir)?)
            } else {
                None
            };
            cmd_analyze(&input, &options, repo.as_ref(), company, output.as_deref()).await
        }
        Commands::Tier { score } => cmd_tier(score),
        Commands::Serve { port } => {
            let settings = Settings {
                port: port.unwrap_or(settings.port),
                ..settings
            };
            spendscore::server::start_server(settings).await
        }
        Commands::Report { action } => {
            cmd_report(action, &FileReportRepository::open(&settings.data_dir)?)
        }
    }
}

fn cmd_columns(input: &Path) -> CliResult {
    eprintln!("📄 Reading headers: {}", input.display());

    let table = parse_file(input)?;
    eprintln!("   Encoding: {}", table.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(table.delimiter));

    let matcher = HeaderMatcher::new(&table.headers);
    for field in CanonicalField::ALL {
        match matcher.resolve_with_kind(field) {
            Some(hit) => {
                let kind = match hit.kind {
                    MatchKind::Exact => "exact",
                    MatchKind::Synonym => "synonym",
                    MatchKind::Contextual => "contextual",
                };
                println!("  {:<12} <- \"{}\" ({})", field.as_str(), hit.header, kind);
            }
            None => println!("  {:<12} -- not found", field.as_str()),
        }
    }
    Ok(())
}

fn cmd_normalize(input: &Path, mapping: Option<ColumnMapping>, output: Option<&Path>) -> CliResult {
    eprintln!("📄 Normalizing: {}", input.display());

    let table = parse_file(input)?;
    let (_, report) = normalize_table(&table, mapping.as_ref())?;

    eprintln!(
        "✅ {} transactions ({} skipped, {} undated)",
        report.transactions.len(),
        report.skipped_rows(),
        report.undated_rows()
    );
    for issue in report.issues.iter().take(5) {
        eprintln!("   Row {}: {}", issue.row, serde_json::to_string(&issue.kind)?);
    }

    let json = serde_json::to_string_pretty(&report.transactions)?;
    write_output(&json, output)
}

fn cmd_score(input: &Path) -> CliResult {
    eprintln!("📊 Scoring: {}", input.display());

    let content = fs::read_to_string(input)?;
    let transactions: Vec<Transaction> = serde_json::from_str(&content)?;
    eprintln!("   {} transactions", transactions.len());

    let result = SpendScoreEngine::new(&transactions).score();
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_analyze(
    input: &Path,
    options: &AnalysisOptions,
    repo: Option<&FileReportRepository>,
    company: Option<String>,
    output: Option<&Path>,
) -> CliResult {
    eprintln!("📄 Processing: {}", input.display());

    let analysis = analyze_file(input, options).await?;
    let score = &analysis.score;

    eprintln!("\n📊 SpendScore: {} - {}", score.final_score, score.tier.label);
    for (metric, value) in &score.breakdown {
        eprintln!("   {:<22} {:>6.1}  (weight {}%)", metric.title(), value, metric.weight());
    }
    if !score.degraded_metrics.is_empty() {
        eprintln!("   ⚠️  Fallback used for {} metric(s)", score.degraded_metrics.len());
    }

    eprintln!("\n💡 Suggestions:");
    for s in &analysis.suggestions {
        eprintln!("   [{}] {}", s.priority, s.text);
    }

    if let Some(repo) = repo {
        let source = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.csv".to_string());
        let report = StoredReport::new(source, company, analysis.clone());
        repo.put(report.clone())?;
        eprintln!("\n💾 Report saved with ID: {}", report.id);
    }

    let json = serde_json::to_string_pretty(&analysis)?;
    write_output(&json, output)
}

fn cmd_tier(score: u8) -> CliResult {
    println!("{}", serde_json::to_string_pretty(&TierInfo::for_score(score))?);
    Ok(())
}

fn cmd_report(action: ReportAction, repo: &dyn ReportRepository) -> CliResult {
    match action {
        ReportAction::List => {
            let reports = repo.list()?;
            if reports.is_empty() {
                eprintln!("📋 No reports stored yet.");
                eprintln!("   Use 'spendscore analyze <file> --save' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored reports ({}):\n", reports.len());
            for r in reports {
                println!("  📄 {} ({})", r.source_name, r.id);
                if let Some(ref company) = r.company_name {
                    println!("     Company: {}", company);
                }
                println!("     Score: {} ({})", r.spend_score(), r.analysis.score.tier.label);
                println!("     Transactions: {}", r.analysis.score.transaction_summary.count);
                println!("     Created: {}", r.created_at);
                println!();
            }
        }

        ReportAction::Show { id } => match repo.get(id)? {
            Some(r) => println!("{}", serde_json::to_string_pretty(&r)?),
            None => return Err(format!("Report not found: {}", id).into()),
        },

        ReportAction::Delete { id } => {
            if !repo.delete(id)? {
                return Err(format!("Report not found: {}", id).into());
            }
            eprintln!("🗑️  Report deleted: {}", id);
        }
    }
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
