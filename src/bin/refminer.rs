//! CLI for the refactor-miner tool.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use git2::Repository;
use refactor_miner::prelude::*;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "refminer")]
#[command(author, version, about = "Refactoring detection and AST diffing", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// YAML or JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Diff file pairs on the current thread only
    #[arg(long, global = true)]
    sequential: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff two commits of a git repository
    Commits {
        /// Base ref
        from: String,

        /// Target ref
        to: String,

        /// Path to the repository
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Diff every first-parent commit between the two refs separately
        #[arg(long)]
        each: bool,

        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Print the text diff of each changed file
        #[arg(long)]
        diff: bool,
    },

    /// Diff two directories
    Dirs {
        before: PathBuf,

        after: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Print the text diff of each changed file
        #[arg(long)]
        diff: bool,
    },

    /// Show supported languages
    Languages,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Refactorings and per-file actions
    Text,
    /// Refactorings only
    Refactorings,
    /// Full report as JSON
    Json,
}

#[derive(Serialize)]
struct Report<'a> {
    before: &'a str,
    after: &'a str,
    skipped: Vec<&'a SkippedFile>,
    #[serde(flatten)]
    project: &'a ProjectDiff,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => DiffConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DiffConfig::default(),
    };
    if cli.sequential {
        config = config.sequential();
    }

    match cli.command {
        Commands::Commits {
            from,
            to,
            repo,
            each,
            format,
            diff,
        } => cmd_commits(&config, &repo, &from, &to, each, format, diff),
        Commands::Dirs {
            before,
            after,
            format,
            diff,
        } => cmd_dirs(&config, &before, &after, format, diff),
        Commands::Languages => cmd_languages(),
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn cmd_commits(
    config: &DiffConfig,
    repo_path: &Path,
    from: &str,
    to: &str,
    each: bool,
    format: Format,
    diff: bool,
) -> Result<()> {
    let repo = Repository::open(repo_path)
        .with_context(|| format!("Failed to open repository {}", repo_path.display()))?;
    let registry = LanguageRegistry::new();

    let ranges = if each {
        let reader = GitReader::new(&repo, config)?;
        reader
            .commit_range(from, to)
            .context("Failed to walk commit range")?
    } else {
        vec![(from.to_string(), to.to_string())]
    };
    if ranges.is_empty() {
        bail!("No commits between {from} and {to}");
    }

    let mut pairs = Vec::with_capacity(ranges.len());
    for (parent, commit) in &ranges {
        let pair = Snapshot::pair_from_git(&repo, parent, commit, config, &registry)
            .with_context(|| format!("Failed to load {parent}..{commit}"))?;
        pairs.push(pair);
    }

    let results = compute_batch(&pairs, config);
    for ((before, after), result) in pairs.iter().zip(results) {
        let project = result
            .with_context(|| format!("Failed to diff {}..{}", before.label(), after.label()))?;
        print_project(before, after, &project, format, diff)?;
    }
    Ok(())
}

fn cmd_dirs(
    config: &DiffConfig,
    before: &Path,
    after: &Path,
    format: Format,
    diff: bool,
) -> Result<()> {
    let registry = LanguageRegistry::new();
    let before = Snapshot::from_directory(before, config, &registry)
        .with_context(|| format!("Failed to load {}", before.display()))?;
    let after = Snapshot::from_directory(after, config, &registry)
        .with_context(|| format!("Failed to load {}", after.display()))?;

    let project = ProjectDiff::between(&before, &after, config).context("Diff failed")?;
    print_project(&before, &after, &project, format, diff)
}

fn print_project(
    before: &Snapshot,
    after: &Snapshot,
    project: &ProjectDiff,
    format: Format,
    diff: bool,
) -> Result<()> {
    for failure in project.failures() {
        eprintln!(
            "warning: no diff for {} -> {}: {}",
            failure.src_path.display(),
            failure.dst_path.display(),
            failure.message
        );
    }

    match format {
        Format::Json => {
            let report = Report {
                before: before.label(),
                after: after.label(),
                skipped: before.skipped().iter().chain(after.skipped()).collect(),
                project,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Format::Refactorings => {
            for refactoring in project.model_diff().refactorings() {
                println!("{refactoring}");
            }
        }
        Format::Text => {
            println!("{}..{}", before.label(), after.label());
            for refactoring in project.model_diff().refactorings() {
                println!("  {refactoring}");
            }

            let mut total = DiffSummary::default();
            for ast_diff in project.all_diffs().filter(|d| !d.is_empty()) {
                let (Some(src), Some(dst)) = (
                    before.ast(ast_diff.src_path()),
                    after.ast(ast_diff.dst_path()),
                ) else {
                    continue;
                };
                println!("{}", ActionListing(ast_diff));
                if diff {
                    println!(
                        "{}",
                        colorized_diff(src.source(), dst.source(), src.path(), dst.path())
                    );
                }
                total.merge(&DiffSummary::from_ast_diff(
                    ast_diff,
                    src.source(),
                    dst.source(),
                ));
            }
            for moved in project.moved_diffs() {
                println!("moved: {}", ActionListing(moved));
            }
            println!("{total}");
        }
    }
    Ok(())
}

fn cmd_languages() -> Result<()> {
    let registry = LanguageRegistry::new();
    println!("Supported languages:");
    for lang in registry.all() {
        println!(
            "  {} (extensions: {})",
            lang.name(),
            lang.extensions().join(", ")
        );
    }
    Ok(())
}
