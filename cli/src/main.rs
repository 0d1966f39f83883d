//! Codeloom CLI - code-aware RAG backend for multi-repository source
//!
//! Ingests Git repositories into a namespaced vector store, keeps them
//! in sync with commit ranges, and answers developer questions over the
//! indexed code.

// CLI tools legitimately use print macros for user output
#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use codeloom_engine::git::GitRepo;
use codeloom_engine::{CancelToken, Config, RepoContext, RetrievalOptions, Service, SyncDriver};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

mod server;

/// Codeloom - code-aware RAG backend
#[derive(Parser)]
#[command(
    name = "codeloom",
    version,
    about = "Ingest repositories and answer questions over their code",
    long_about = "Codeloom chunks multi-repository source code, embeds it into a namespaced\nvector store, and answers natural-language developer queries from it."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a repository at a commit into its namespace
    Ingest {
        /// Repository URL or owner/repo shorthand
        repository: String,

        /// Commit SHA or ref to ingest (default: remote HEAD)
        #[arg(long = "ref")]
        reference: Option<String>,

        /// Vector store namespace (default: repository name)
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Sync a commit range of a local checkout into the store
    Sync {
        /// Path to the git superproject root
        #[arg(long, default_value = ".")]
        repo_root: PathBuf,

        /// Start of the commit range
        #[arg(long)]
        from_commit: Option<String>,

        /// End of the commit range
        #[arg(long, default_value = "HEAD")]
        to_commit: String,

        /// Repository identifier stored in chunk metadata
        #[arg(long)]
        repository: Option<String>,

        /// Vector store namespace (default: repository name)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Re-run only the paths recorded in the error journal
        #[arg(long)]
        retry_errors: bool,

        /// Print the A/M/D plan without applying it
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask a question over the indexed repositories
    Query {
        /// The natural-language question
        query: String,

        /// Restrict the search to these repositories
        #[arg(short, long, value_delimiter = ',')]
        repositories: Vec<String>,

        /// Fused results to keep (max 50)
        #[arg(long)]
        top_k: Option<usize>,

        /// Results per namespace (max 20)
        #[arg(long)]
        per_namespace_k: Option<usize>,

        /// Minimum similarity score in [0, 1]
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// List indexed repositories
    Repos,

    /// Run the HTTP control plane (webhook, query, repositories)
    Serve {
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    let service = Arc::new(Service::from_config(config).context("failed to wire the pipeline")?);
    let cancel = CancelToken::new();

    match cli.command {
        Commands::Ingest { repository, reference, namespace } => {
            cmd_ingest(&service, &repository, reference.as_deref(), namespace, &cancel)
        }
        Commands::Sync {
            repo_root,
            from_commit,
            to_commit,
            repository,
            namespace,
            retry_errors,
            dry_run,
        } => cmd_sync(
            &service,
            &repo_root,
            from_commit.as_deref(),
            &to_commit,
            repository,
            namespace,
            retry_errors,
            dry_run,
            &cancel,
        ),
        Commands::Query { query, repositories, top_k, per_namespace_k, min_score } => {
            let options = RetrievalOptions::clamped(top_k, per_namespace_k, min_score);
            let repos = if repositories.is_empty() { None } else { Some(repositories.as_slice()) };
            let answer = service.answer(&query, repos, options, &cancel)?;
            println!("{answer}");
            Ok(())
        }
        Commands::Repos => {
            for repository in service.repositories()? {
                println!("{repository}");
            }
            Ok(())
        }
        Commands::Serve { bind } => server::serve(service, &bind),
    }
}

fn cmd_ingest(
    service: &Service,
    repository: &str,
    reference: Option<&str>,
    namespace: Option<String>,
    cancel: &CancelToken,
) -> Result<()> {
    let (url, name) = resolve_repository(repository);
    let namespace = namespace.unwrap_or_else(|| RepoContext::namespace_for(&name));

    println!("{} {name} into namespace {namespace}", "Ingesting".green().bold());
    let start = Instant::now();
    let report = service.ingester().ingest_repository(&url, &name, reference, &namespace, cancel)?;

    println!(
        "{} {} files, {} chunks at {} in {:.1?}",
        "Done:".green().bold(),
        report.files_processed,
        report.chunks_upserted,
        &report.commit_sha[..8.min(report.commit_sha.len())],
        start.elapsed()
    );
    if report.files_failed > 0 {
        eprintln!(
            "{} {} files failed; see {}",
            "Warning:".yellow().bold(),
            report.files_failed,
            service.ingester().journal().path().display()
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_sync(
    service: &Service,
    repo_root: &PathBuf,
    from_commit: Option<&str>,
    to_commit: &str,
    repository: Option<String>,
    namespace: Option<String>,
    retry_errors: bool,
    dry_run: bool,
    cancel: &CancelToken,
) -> Result<()> {
    let repo = GitRepo::open(repo_root).context("repo-root is not a git repository")?;
    let repository = repository.unwrap_or_else(|| {
        repo_root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "local".to_owned())
    });
    let namespace = namespace.unwrap_or_else(|| RepoContext::namespace_for(&repository));
    let driver = SyncDriver::new(Arc::clone(service.ingester()));

    if retry_errors {
        let to_sha = repo.rev_parse(to_commit)?;
        let ctx = RepoContext::new(&repository, to_sha, &namespace);
        let report = driver.retry_errors(repo_root, &ctx, cancel);
        println!(
            "{} {} processed, {} deleted, {} failed",
            "Retry complete:".green().bold(),
            report.files_processed,
            report.files_deleted,
            report.files_failed
        );
        return Ok(());
    }

    let Some(from_commit) = from_commit else {
        bail!("--from-commit is required unless --retry-errors is given");
    };

    if dry_run {
        let to_sha = repo.rev_parse(to_commit)?;
        for change in driver.plan(&repo, from_commit, &to_sha)? {
            println!("{}\t{}", change.status.letter(), change.file_path);
        }
        return Ok(());
    }

    let ctx = RepoContext::new(&repository, "", &namespace);
    let report = driver.sync_range(&repo, &ctx, from_commit, to_commit, cancel)?;
    println!(
        "{} {} processed, {} deleted, {} skipped, {} failed, {} chunks",
        "Sync complete:".green().bold(),
        report.files_processed,
        report.files_deleted,
        report.files_skipped,
        report.files_failed,
        report.chunks_upserted
    );
    if report.files_failed > 0 {
        eprintln!(
            "{} failures recorded; re-run with --retry-errors",
            "Warning:".yellow().bold()
        );
    }
    Ok(())
}

/// Resolve a CLI repository argument into (clone URL, identifier)
fn resolve_repository(input: &str) -> (String, String) {
    if input.contains("://") || input.starts_with("git@") {
        let name = input
            .trim_end_matches(".git")
            .rsplit('/')
            .take(2)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("/");
        (input.to_owned(), name)
    } else {
        (format!("https://github.com/{input}.git"), input.to_owned())
    }
}
