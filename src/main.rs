use clap::{Parser, Subcommand};
use colored::Colorize;
use papermatch::adapters::{self, pwc::PwcPrefs};
use papermatch::batch::match_library;
use papermatch::cache::Cache;
use papermatch::export::{self, ExportFormat, TagMatch};
use papermatch::gate::ConfirmationGate;
use papermatch::import::Importer;
use papermatch::progress::BarSink;
use papermatch::report::{self, BatchReport};
use papermatch::resolver::ArxivResolver;
use papermatch::sources::KnownSource;
use papermatch::store::{JsonFileStore, PaperStore};
use papermatch::{EngineConfig, Reconciler};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "papermatch")]
#[command(version = "0.1.0")]
#[command(about = "Fill in venues, citations and code links for a paper library", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Library file (defaults to the user data directory)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Disable Papers with Code
    #[arg(long, global = true)]
    no_pwc: bool,

    /// Disable DBLP API
    #[arg(long, global = true)]
    no_dblp: bool,

    /// Disable CrossRef API
    #[arg(long, global = true)]
    no_crossref: bool,

    /// Disable caching of API responses
    #[arg(long, global = true)]
    no_cache: bool,

    /// Remove cached API responses before running
    #[arg(long, global = true)]
    clear_cache: bool,

    /// Only take code links from official repositories
    #[arg(long, global = true)]
    pwc_official: bool,

    /// Prefer repositories using this framework (e.g. pytorch)
    #[arg(long, global = true)]
    pwc_framework: Option<String>,

    /// Treat pages from this source as unrecognized (repeatable)
    #[arg(long = "ignore-source", global = true)]
    ignore_sources: Vec<KnownSource>,

    /// Verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up library papers that have no venue yet
    Match {
        /// Accept every proposed update without asking
        #[arg(long, short)]
        yes: bool,

        /// Only list proposed updates
        #[arg(long, conflicts_with = "yes")]
        dry_run: bool,
    },
    /// Import papers from a JSON list of URLs
    Import {
        /// JSON file with URLs or {url, codeLink, tags} objects
        file: PathBuf,
    },
    /// Export bibtex or import lists
    Export {
        /// bib, bib-json, json or json-urls
        #[arg(long, short, default_value = "bib")]
        format: ExportFormat,

        /// Only papers with these tags (comma separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Match any of the tags instead of all
        #[arg(long)]
        any: bool,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            use_pwc: !self.no_pwc,
            use_dblp: !self.no_dblp,
            use_crossref: !self.no_crossref,
            cache_enabled: !self.no_cache,
            pwc: PwcPrefs {
                official_only: self.pwc_official,
                framework: self.pwc_framework.clone(),
            },
            ignored_sources: self.ignore_sources.iter().copied().collect(),
        }
    }
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("{} {}", "Error:".red().bold(), message);
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("papermatch=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    if args.clear_cache {
        if let Err(e) = Cache::new(true).and_then(|cache| cache.clear()) {
            return fail(format!("Failed to clear cache: {}", e));
        }
    }

    let path = args.store.clone().unwrap_or_else(JsonFileStore::default_path);
    let store = Arc::new(JsonFileStore::new(path));
    let config = args.engine_config();

    match &args.command {
        Command::Match { yes, dry_run } => run_match(store, &config, *yes, *dry_run).await,
        Command::Import { file } => run_import(store, &config, file).await,
        Command::Export {
            format,
            tags,
            any,
            output,
        } => {
            let mode = if *any { TagMatch::Any } else { TagMatch::All };
            run_export(store.as_ref(), *format, tags, mode, output.as_deref()).await
        }
    }
}

async fn run_match(
    store: Arc<JsonFileStore>,
    config: &EngineConfig,
    yes: bool,
    dry_run: bool,
) -> ExitCode {
    let reconciler = match Reconciler::new(config) {
        Ok(r) => r,
        Err(e) => return fail(format!("Failed to initialize providers: {}", e)),
    };

    println!(
        "Matching {} against {}...",
        store.path().display().to_string().cyan(),
        reconciler.provider_names().join(", ")
    );

    let mut gate = ConfirmationGate::new(store.clone());
    let mut sink = BarSink::new();
    let report = match match_library(store.as_ref(), &reconciler, &mut gate, &mut sink).await {
        Ok(report) => report,
        Err(e) => return fail(e),
    };
    report.print("papermatch match report");

    if gate.is_empty() {
        println!("{}", "No updates to review.".yellow());
        return exit_code(&report);
    }

    println!("{}", format!("PENDING UPDATES ({})", gate.len()).bold());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let total = gate.len();
    let mut accepted = 0;

    for id in gate.pending_ids() {
        if let Some(update) = gate.get(&id) {
            report::print_update(update);
        }
        if dry_run {
            continue;
        }

        let approve = if yes {
            true
        } else {
            println!("  Accept? [y/N]");
            match lines.next_line().await {
                Ok(Some(answer)) => matches!(answer.trim(), "y" | "Y" | "yes"),
                Ok(None) => false,
                Err(e) => return fail(e),
            }
        };

        if approve {
            match gate.accept(&id).await {
                Ok(_) => accepted += 1,
                Err(e) => eprintln!("  {} {}", "Error:".red().bold(), e),
            }
        } else if let Err(e) = gate.reject(&id) {
            eprintln!("  {} {}", "Error:".red().bold(), e);
        }
    }

    if !dry_run {
        println!();
        println!("Accepted {} of {} updates", accepted.to_string().green(), total);
    }
    exit_code(&report)
}

async fn run_import(store: Arc<JsonFileStore>, config: &EngineConfig, file: &Path) -> ExitCode {
    if !file.exists() {
        return fail(format!("File not found: {}", file.display()));
    }
    let json = match tokio::fs::read_to_string(file).await {
        Ok(json) => json,
        Err(e) => return fail(format!("Failed to read {}: {}", file.display(), e)),
    };

    let reconciler = match Reconciler::new(config) {
        Ok(r) => r,
        Err(e) => return fail(format!("Failed to initialize providers: {}", e)),
    };
    let resolver = match adapters::http_client() {
        Ok(client) => ArxivResolver::new(client),
        Err(e) => return fail(e),
    };

    println!("Importing {}...", file.display().to_string().cyan());
    let importer = Importer::new(store.as_ref(), &resolver, &reconciler)
        .ignoring(config.ignored_sources.iter().copied());
    let mut sink = BarSink::new();

    match importer.run_json(&json, &mut sink).await {
        Ok(report) => {
            report.print("papermatch import report");
            exit_code(&report)
        }
        Err(e) => fail(e),
    }
}

async fn run_export(
    store: &dyn PaperStore,
    format: ExportFormat,
    tags: &[String],
    mode: TagMatch,
    output: Option<&Path>,
) -> ExitCode {
    let papers = match store.get_all().await {
        Ok(papers) => papers,
        Err(e) => return fail(e),
    };
    let selected = export::select(&papers, tags, mode);
    let content = match export::render(&selected, format) {
        Ok(content) => content,
        Err(e) => return fail(e),
    };

    match output {
        Some(path) => {
            if let Err(e) = tokio::fs::write(path, content).await {
                return fail(format!("Failed to write {}: {}", path.display(), e));
            }
            eprintln!(
                "Exported {} papers to {}",
                selected.len(),
                path.display().to_string().cyan()
            );
        }
        None => println!("{}", content),
    }
    ExitCode::SUCCESS
}

fn exit_code(report: &BatchReport) -> ExitCode {
    if report.count_errors() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
