use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use bookmark_domains::clipboard::{Clipboard, FileClipboard, SystemClipboard};
use bookmark_domains::config::Config;
use bookmark_domains::query::SortOrder;
use bookmark_domains::report::ConsoleReport;
use bookmark_domains::stores::{detect_bookmark_path, open_store};
use bookmark_domains::{DomainEngine, DomainError, StoreKind};

#[derive(Parser)]
#[command(name = "bookmark-domains")]
#[command(about = "Group browser bookmarks by domain and move or delete them in bulk", long_about = None)]
#[command(version)]
struct Cli {
    /// Bookmark store: chromium or firefox
    #[arg(long, global = true)]
    store: Option<StoreKind>,

    /// Bookmarks file (Chromium `Bookmarks` or Firefox `places.sqlite`)
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    /// Config file (default: ~/.bookmark-domains.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write query exports to this file instead of the clipboard
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Domain(DomainCommand),

    /// Read commands from stdin, one per line, against a single index
    Shell,
}

#[derive(Subcommand)]
enum DomainCommand {
    /// Domains with exactly N bookmarks
    Exact {
        n: usize,

        /// Keep domains containing this text (repeatable)
        #[arg(short = 'f', long = "filter")]
        filters: Vec<String>,

        /// Filters must equal the domain
        #[arg(long)]
        strict: bool,

        /// Bookmark order inside each domain, by date added
        #[arg(long, value_enum, default_value_t = SortOrder::Asc)]
        order: SortOrder,
    },

    /// Domains with MIN to MAX bookmarks, most bookmarked first
    Range {
        min: usize,
        max: usize,

        /// Keep domains containing this text (repeatable)
        #[arg(short = 'f', long = "filter")]
        filters: Vec<String>,

        /// Filters must equal the domain
        #[arg(long)]
        strict: bool,

        /// Bookmark order inside each domain, by date added
        #[arg(long, value_enum, default_value_t = SortOrder::Asc)]
        order: SortOrder,
    },

    /// Move every bookmark of the given domains into a folder
    Move {
        /// Folder title; created when no folder has this title
        folder: String,

        #[arg(required = true)]
        domains: Vec<String>,

        /// Show what would be moved without changing anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Delete every bookmark of a domain
    Delete {
        domain: String,

        /// Matching mode: exact, tree (with subdomains) or loose (substring)
        #[arg(short, long, default_value = "exact")]
        mode: String,

        /// Show what would be deleted without changing anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Totals, folder statistics and the most bookmarked domains
    Stats {
        /// Number of domains to list
        #[arg(long)]
        top: Option<usize>,
    },
}

#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand)]
enum ShellCommand {
    #[command(flatten)]
    Domain(DomainCommand),

    /// Rebuild the index from the store
    Reindex,

    /// Leave the shell
    #[command(alias = "exit")]
    Quit,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut engine = match build_engine(&cli).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Engine commands report their own errors; only the exit code is left.
    if engine.reindex().await.is_err() {
        return ExitCode::FAILURE;
    }

    let outcome = match cli.command {
        Commands::Domain(command) => execute(&mut engine, command).await,
        Commands::Shell => shell(&mut engine).await.map_err(|e| {
            eprintln!("❌ {:#}", e);
        }),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

async fn build_engine(cli: &Cli) -> Result<DomainEngine> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store = store;
    }
    if let Some(path) = &cli.path {
        config.path = Some(path.clone());
    }

    let path = match &config.path {
        Some(path) => path.clone(),
        None => detect_bookmark_path(config.store)?,
    };
    info!("📂 Using {} bookmarks at {:?}", config.store.name(), path);
    let store = open_store(config.store, &path)
        .await
        .with_context(|| format!("Failed to open {} bookmarks at {:?}", config.store.name(), path))?;

    let clipboard: Box<dyn Clipboard> = match &cli.output {
        Some(output) => Box::new(FileClipboard::new(output.clone())),
        None => Box::new(SystemClipboard::detect()),
    };

    Ok(DomainEngine::new(store, config, clipboard, Box::new(ConsoleReport::new())))
}

async fn execute(engine: &mut DomainEngine, command: DomainCommand) -> Result<(), ()> {
    let result: Result<(), DomainError> = match command {
        DomainCommand::Exact {
            n,
            filters,
            strict,
            order,
        } => engine.by_exact_count(n, filters, strict, order).map(drop),
        DomainCommand::Range {
            min,
            max,
            filters,
            strict,
            order,
        } => engine.by_range_count(min, max, filters, strict, order).map(drop),
        DomainCommand::Move {
            folder,
            domains,
            dry_run,
        } => engine
            .move_domains_to_folder(&domains, &folder, dry_run)
            .await
            .map(drop),
        DomainCommand::Delete {
            domain,
            mode,
            dry_run,
        } => engine.delete_domain(&domain, &mode, dry_run).await.map(drop),
        DomainCommand::Stats { top } => engine.print_stats(top),
    };
    result.map_err(|e| debug!("Command failed: {:?}", e))
}

async fn shell(engine: &mut DomainEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("bookmarks> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let words = split_words(&line);
        if words.is_empty() {
            continue;
        }

        match ShellLine::try_parse_from(&words) {
            Ok(ShellLine {
                command: ShellCommand::Domain(command),
            }) => {
                let _ = execute(engine, command).await;
            }
            Ok(ShellLine {
                command: ShellCommand::Reindex,
            }) => {
                let _ = engine.reindex().await;
            }
            Ok(ShellLine {
                command: ShellCommand::Quit,
            }) => break,
            Err(e) => {
                let _ = e.print();
            }
        }
    }

    println!();
    Ok(())
}

/// Whitespace split that keeps double-quoted runs together.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_word = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
