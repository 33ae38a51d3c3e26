use anyhow::Context;
use clap::{Parser, Subcommand};
use llama_rs::sink::JsonLinesSink;
use llama_rs::{LlamaBuilder, RuleSet, ScanConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "llama-rs")]
#[command(about = "Forensic triage with hash, metadata and pattern rules", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory tree with a set of rules
    Scan {
        /// Rule file or directory
        #[arg(short, long)]
        rules: PathBuf,

        /// Directory to scan
        #[arg(short, long)]
        input: PathBuf,

        /// JSON lines output file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of worker threads
        #[arg(short, long)]
        threads: Option<usize>,

        /// YAML scan configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Parse rules and report every error
    Check {
        /// Rule file or directory
        #[arg(short, long)]
        rules: PathBuf,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .init();
    }

    match cli.command {
        Command::Check { rules } => check(rules),
        Command::Scan {
            rules,
            input,
            output,
            threads,
            config,
        } => {
            let mut config = match config {
                Some(path) => ScanConfig::from_yaml_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => ScanConfig::default(),
            };
            if let Some(threads) = threads {
                config.worker_threads = threads;
            }

            let llama = LlamaBuilder::new()
                .add_rule_path(&rules)
                .config(config)
                .build()
                .context("loading rules")?;
            for e in llama.rule_errors() {
                eprintln!("{}", e);
            }

            let sink = JsonLinesSink::create(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            let stats = llama
                .scan(&input, Arc::new(sink))
                .with_context(|| format!("scanning {}", input.display()))?;
            eprintln!(
                "Scanned {} entries: {} files, {} failed, {} hits, {} rule matches",
                stats.entries, stats.files_processed, stats.failed_files, stats.hits, stats.rule_matches
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn check(path: PathBuf) -> anyhow::Result<ExitCode> {
    let mut rules = RuleSet::new();
    rules
        .read_path(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    for e in rules.errors() {
        eprintln!("{}", e);
    }
    eprintln!(
        "{} rules, {} errors in {} sources",
        rules.len(),
        rules.errors().len(),
        rules.source_count()
    );
    Ok(if rules.errors().is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
