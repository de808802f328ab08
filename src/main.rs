//! Rockskip CLI - incremental symbol search over git history

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use rockskip::config::{ensure_db_dir, load_config};
use rockskip::git::CliGit;
use rockskip::parser::CtagsParserFactory;
use rockskip::{RockskipConfig, SearchMode, SearchParameters, Service, SqliteStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rockskip")]
#[command(version = "0.0.1")]
#[command(about = "Incremental symbol search over git history")]
#[command(long_about = r#"
Rockskip indexes the symbols of every first-parent commit of a repository and
answers symbol searches at any indexed commit, indexing missing commits on demand.

Repositories are read from local clones under `repos_root/<repo name>`.

Example usage:
  rockskip index --repo github.com/org/app --commit HEAD
  rockskip search --repo github.com/org/app --commit HEAD --query '^NewServer$' --regexp
  rockskip serve
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen address (overrides the config)
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },

    /// Index a commit and its missing first-parent ancestors
    Index {
        /// Repository name (directory under repos_root)
        #[arg(short, long)]
        repo: String,

        /// Commit to index
        #[arg(long, default_value = "HEAD")]
        commit: String,
    },

    /// Search symbols at a commit
    Search {
        /// Repository name (directory under repos_root)
        #[arg(short, long)]
        repo: String,

        /// Commit to search
        #[arg(long, default_value = "HEAD")]
        commit: String,

        /// Symbol name
        #[arg(short, long, default_value = "")]
        query: String,

        /// Treat the query as a regex
        #[arg(long)]
        regexp: bool,

        /// Match case
        #[arg(long)]
        case_sensitive: bool,

        /// Path regex that results must match (repeatable)
        #[arg(short, long)]
        include: Vec<String>,

        /// Path regex that results must not match
        #[arg(short, long, default_value = "")]
        exclude: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "100")]
        limit: usize,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Search the nearest indexed ancestor instead of waiting for indexing
        #[arg(long)]
        approximate: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Evict least recently searched repos beyond max_repos
    Evict,

    /// Show statistics about the database
    Stats,
}

fn build_service(config: RockskipConfig) -> anyhow::Result<Arc<Service>> {
    ensure_db_dir(&config.database)?;
    let store = SqliteStore::open(&config.database, config.read_pool_size)?;
    let git = Arc::new(CliGit::new(config.repos_root.clone()));
    let parsers = Arc::new(CtagsParserFactory::new(config.ctags_command.clone()));
    Ok(Service::start(config, store, git.clone(), git, parsers))
}

/// Resolve symbolic refs like HEAD to a hash, since commits are stored by hash
async fn resolve_commit(config: &RockskipConfig, repo: &str, commit: &str) -> anyhow::Result<String> {
    let output = tokio::process::Command::new("git")
        .arg("-C")
        .arg(config.repos_root.join(repo))
        .args(["rev-parse", "--verify", "--end-of-options"])
        .arg(format!("{commit}^{{commit}}"))
        .output()
        .await?;
    if !output.status.success() {
        anyhow::bail!(
            "cannot resolve {repo}@{commit}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }

    match cli.command {
        Commands::Serve { listen } => {
            let addr: SocketAddr = match listen {
                Some(addr) => addr,
                None => config.listen.parse()?,
            };
            let service = build_service(config)?;
            rockskip::server::start_server(addr, service).await?;
        }

        Commands::Index { repo, commit } => {
            let commit = resolve_commit(&config, &repo, &commit).await?;
            let service = build_service(config)?;
            let cancel = CancellationToken::new();
            service.index(&cancel, &repo, &commit).await?;
            println!("Indexed {}@{}", repo, commit);
            println!("{}", service.stats()?);
            service.shutdown();
        }

        Commands::Search {
            repo,
            commit,
            query,
            regexp,
            case_sensitive,
            include,
            exclude,
            limit,
            timeout,
            approximate,
            format,
        } => {
            let commit = resolve_commit(&config, &repo, &commit).await?;
            let service = build_service(config)?;
            let params = SearchParameters {
                repo,
                commit_id: commit,
                query,
                is_regexp: regexp,
                is_case_sensitive: case_sensitive,
                include_patterns: include,
                exclude_pattern: exclude,
                first: limit,
                timeout: timeout.map(Duration::from_secs),
                mode: approximate.then_some(SearchMode::NearestIndexedAncestor),
            };

            let cancel = CancellationToken::new();
            let outcome = service.search_with_outcome(&cancel, params).await?;

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&outcome)?),
                _ => {
                    if outcome.approximate {
                        println!("(searched nearest indexed ancestor {})", outcome.searched_commit);
                    }
                    if outcome.symbols.is_empty() {
                        println!("No symbols found.");
                    }
                    for symbol in &outcome.symbols {
                        let parent = symbol
                            .parent
                            .as_deref()
                            .map(|p| format!(" in {p}"))
                            .unwrap_or_default();
                        println!(
                            "{}:{}:{}  {} {}{}",
                            symbol.path, symbol.line, symbol.character, symbol.kind, symbol.name, parent
                        );
                    }
                }
            }
            service.shutdown();
        }

        Commands::Evict => {
            let service = build_service(config)?;
            let deleted = service.evict_once().await?;
            println!("Evicted {} repositories", deleted);
            println!("{}", service.stats()?);
            service.shutdown();
        }

        Commands::Stats => {
            ensure_db_dir(&config.database)?;
            let store = SqliteStore::open(&config.database, 1)?;
            println!("{}", store.stats()?);
        }
    }

    Ok(())
}
