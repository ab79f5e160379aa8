//! # commlink Inspector CLI
//!
//! Command-line tool for looking at a replay file and at killswitch documents.
//!
//! Usage:
//!   commlink-inspect pending [--file PATH] [--limit N] [--format json|summary]
//!   commlink-inspect stats [--file PATH]
//!   commlink-inspect kills --source URL [--version V]
//!   commlink-inspect check --source URL <feature>... [--data JSON|@FILE] [--version V]

use clap::{Parser, Subcommand};
use commlink::config::ReplayConfig;
use commlink::http::build_client;
use commlink::killswitch::try_fetch;
use commlink::replay::{read_entries, ReplayEntry};
use commlink::types::{app_version, parse_version};
use semver::Version;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "commlink-inspect")]
#[command(about = "Inspect commlink replay files and killswitch documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entries waiting in a replay file
    Pending {
        /// Path to the replay file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format: json, summary
        #[arg(long, default_value = "summary")]
        format: String,
    },

    /// Per-uploader counts and unparseable lines
    Stats {
        /// Path to the replay file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List the kills that apply to a version
    Kills {
        /// Document location (`http(s)://` or `file:`)
        #[arg(short, long)]
        source: String,

        /// Version to evaluate against (defaults to this build)
        #[arg(long)]
        version: Option<String>,
    },

    /// Run features through the killswitches and show the verdict
    Check {
        /// Document location (`http(s)://` or `file:`)
        #[arg(short, long)]
        source: String,

        /// Features to check, in order
        #[arg(required = true)]
        features: Vec<String>,

        /// JSON data to sanitize, or `@path` to read it from a file
        #[arg(short, long)]
        data: Option<String>,

        /// Version to evaluate against (defaults to this build)
        #[arg(long)]
        version: Option<String>,
    },
}

fn replay_file(file: Option<PathBuf>) -> PathBuf {
    file.unwrap_or_else(|| ReplayConfig::default().path)
}

fn resolve_version(raw: Option<&str>) -> Result<Version, String> {
    match raw {
        None => Ok(app_version()),
        Some(raw) => parse_version(raw).ok_or_else(|| format!("Not a version: {:?}", raw)),
    }
}

fn load_data(raw: Option<&str>) -> Result<Value, String> {
    let text = match raw {
        None => return Ok(Value::Object(Default::default())),
        Some(raw) => match raw.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path).map_err(|e| format!("Reading {}: {}", path, e))?,
            None => raw.to_string(),
        },
    };
    serde_json::from_str(&text).map_err(|e| format!("Invalid --data JSON: {}", e))
}

fn print_entry_summary(position: usize, entry: &ReplayEntry) {
    let event = entry
        .message
        .get("message")
        .and_then(|m| m.get("event"))
        .and_then(Value::as_str)
        .unwrap_or("-");
    println!(
        "{:>5}  {:<20} {:<24} {}",
        position,
        entry.uploader_id,
        event,
        entry.schema_ref().unwrap_or("(no $schemaRef)")
    );
}

#[tokio::main]
async fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pending { file, limit, format } => {
            let path = replay_file(file);
            let contents = read_entries(&path).map_err(|e| e.to_string())?;
            let shown: Vec<&ReplayEntry> = contents
                .entries
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .collect();

            match format.as_str() {
                "json" => {
                    let json = serde_json::to_string_pretty(&shown).map_err(|e| e.to_string())?;
                    println!("{}", json);
                }
                "summary" => {
                    println!(
                        "📋 {} pending entries in {} (showing {}):\n",
                        contents.entries.len(),
                        path.display(),
                        shown.len()
                    );
                    for (idx, entry) in shown.iter().enumerate() {
                        print_entry_summary(idx + 1, entry);
                    }
                }
                other => return Err(format!("Unknown format: {}", other)),
            }
        }

        Commands::Stats { file } => {
            let path = replay_file(file);
            let contents = read_entries(&path).map_err(|e| e.to_string())?;

            let mut by_uploader: BTreeMap<&str, usize> = BTreeMap::new();
            for entry in &contents.entries {
                *by_uploader.entry(entry.uploader_id.as_str()).or_default() += 1;
            }

            println!("📊 Replay File Statistics\n");
            println!("File:         {}", path.display());
            println!("Pending:      {}", contents.entries.len());
            println!("Unparseable:  {}", contents.unparseable.len());
            println!();
            println!("By uploader:");
            for (uploader, count) in &by_uploader {
                println!("  - {:<20} {}", uploader, count);
            }
            for (line_no, line) in &contents.unparseable {
                println!("  ! line {}: {}", line_no, line);
            }
        }

        Commands::Kills { source, version } => {
            let version = resolve_version(version.as_deref())?;
            let client = build_client(Duration::from_secs(10), &ReplayConfig::default().user_agent())
                .map_err(|e| e.to_string())?;
            let set = try_fetch(&client, &source).await.map_err(|e| e.to_string())?;

            println!("🛑 Killswitches for {} (schema {}):\n", version, set.schema_version);
            if let Some(updated) = &set.last_updated {
                println!("Last updated: {}\n", updated);
            }
            match set.for_version(&version) {
                Some(switches) => {
                    println!("Range: {}", switches.version);
                    for kill in &switches.kills {
                        let kind = if kill.has_rules() { "sanitize" } else { "veto" };
                        println!("  - {:<40} [{}] {}", kill.pattern, kind, kill.reason);
                    }
                }
                None => println!("No range matches this version"),
            }
        }

        Commands::Check {
            source,
            features,
            data,
            version,
        } => {
            let version = resolve_version(version.as_deref())?;
            let mut data = load_data(data.as_deref())?;
            let client = build_client(Duration::from_secs(10), &ReplayConfig::default().user_agent())
                .map_err(|e| e.to_string())?;
            let set = try_fetch(&client, &source).await.map_err(|e| e.to_string())?;

            for feature in &features {
                let disabled = set.get_disabled(feature, &version);
                if disabled.has_kill() {
                    println!("  - {}: {}", feature, disabled.reason());
                } else {
                    println!("  - {}: not killed", feature);
                }
            }

            let abort = set
                .check_multiple(&mut data, &features, &version)
                .map_err(|e| e.to_string())?;
            if abort {
                println!("\n❌ Vetoed");
            } else {
                println!("\n✓ Allowed");
                let json = serde_json::to_string_pretty(&data).map_err(|e| e.to_string())?;
                println!("{}", json);
            }
        }
    }

    Ok(())
}
