use crate::config::{Settings, DEFAULT_BLAME_CONCURRENCY, DEFAULT_GITHUB_API};
use crate::error::AnalyzerError;
use crate::git::{GitProvider, HostingService, RepoHost, VcsProvider};
use crate::model::AnalysisReport;
use crate::orchestrator::Analyzer;
use crate::output;
use crate::queue;
use crate::service::{AnalysisService, Reports};
use crate::store::{SqliteStore, Store};
use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "repo-analyzer")]
#[command(about = "Per-contributor line ownership and commit cadence for git repositories")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(long, env = "REPO_ANALYZER_DB", help = "Path to the analysis database")]
    pub db: Option<PathBuf>,

    #[arg(long, env = "REPO_ANALYZER_CHECKOUT_ROOT", help = "Directory checkouts are placed under")]
    pub checkout_root: Option<PathBuf>,

    #[arg(
        long,
        env = "REPO_ANALYZER_BLAME_CONCURRENCY",
        default_value_t = DEFAULT_BLAME_CONCURRENCY,
        help = "Maximum simultaneous blame operations (0 for no limit)"
    )]
    pub blame_concurrency: usize,

    #[arg(
        long,
        env = "REPO_ANALYZER_COMMIT_WINDOW",
        default_value = "365days",
        help = "Trailing window of commits used for cadence (e.g. 365days, 26weeks)"
    )]
    pub commit_window: String,

    #[arg(long, env = "REPO_ANALYZER_GITHUB_API", default_value = DEFAULT_GITHUB_API, help = "GitHub REST API base url")]
    pub github_api: String,

    #[arg(short, long, global = true, help = "Debug logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Only log warnings and errors")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze one or more repositories and print the results
    Analyze {
        #[arg(long, help = "Output as JSON")]
        json: bool,

        #[arg(required = true, help = "Repository urls (scheme://host/<owner>/<repo>)")]
        repos: Vec<String>,
    },
    /// Show stored results without analyzing
    #[command(group(ArgGroup::new("key").required(true).args(["request_id", "repo"])))]
    Show {
        #[arg(long, help = "Output as JSON")]
        json: bool,

        #[arg(long, help = "Request id returned by analyze")]
        request_id: Option<String>,

        #[arg(long, help = "Repository url")]
        repo: Option<String>,
    },
}

impl CommonArgs {
    pub fn settings(&self) -> Result<Settings> {
        let commit_window = humantime::parse_duration(&self.commit_window)
            .with_context(|| format!("Invalid commit window '{}'", self.commit_window))?;
        Ok(Settings {
            db_path: self.db.clone().unwrap_or_else(Settings::default_db_path),
            checkout_root: self
                .checkout_root
                .clone()
                .unwrap_or_else(Settings::default_checkout_root),
            blame_concurrency: self.blame_concurrency,
            commit_window,
            github_api: self.github_api.clone(),
        })
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<()> {
        let json = match &self.command {
            Commands::Analyze { json, .. } | Commands::Show { json, .. } => *json,
        };
        init_logging(self.common.verbose, self.common.quiet || json);

        let settings = self.common.settings()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        match self.command {
            Commands::Analyze { json, repos } => runtime.block_on(analyze(settings, repos, json)),
            Commands::Show {
                json,
                request_id,
                repo,
            } => show(&settings, request_id, repo, json),
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn open_store(settings: &Settings) -> Result<Arc<dyn Store>> {
    let store = SqliteStore::open(&settings.db_path).with_context(|| {
        format!("Failed to open analysis database {}", settings.db_path.display())
    })?;
    Ok(Arc::new(store))
}

async fn analyze(settings: Settings, repos: Vec<String>, json: bool) -> Result<()> {
    let store = open_store(&settings)?;
    let vcs: Arc<dyn VcsProvider> = Arc::new(GitProvider::new());
    let host: Arc<dyn RepoHost> = Arc::new(
        HostingService::new(settings.github_api.clone()).context("Failed to build HTTP client")?,
    );
    let analyzer = Arc::new(Analyzer::new(store.clone(), vcs, &settings));
    let (queue, worker) = queue::channel(analyzer);
    let worker = tokio::spawn(worker.run());

    let service = AnalysisService::new(store, host, queue);
    let reports = service.reports().clone();
    let mut submitted = Vec::new();
    let mut rejected = 0usize;
    for repo in &repos {
        match service.submit(repo).await {
            Ok(request_id) => {
                if !json {
                    eprintln!("{repo}: request {request_id}");
                }
                submitted.push(request_id);
            }
            Err(e @ (AnalyzerError::NotFound(_) | AnalyzerError::InvalidRepoUrl(_))) => {
                eprintln!("{repo}: {e}");
                rejected += 1;
            }
            Err(e) if e.is_transient() => {
                eprintln!("{repo}: {e} (retry later)");
                rejected += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to submit {repo}")),
        }
    }
    // Closing the queue lets the worker finish once it has drained.
    drop(service);

    let spinner = (!json).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Analyzing {} repositories...", submitted.len()));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    });
    worker.await.context("Analysis worker panicked")?;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let mut results: Vec<AnalysisReport> = Vec::new();
    for request_id in &submitted {
        if let Some(report) = reports
            .by_request_id(request_id)
            .context("Failed to read analysis results")?
        {
            results.push(report);
        }
    }
    output::print_reports(&results, json)?;

    if rejected > 0 {
        bail!("{rejected} of {} repositories could not be submitted", repos.len());
    }
    Ok(())
}

fn show(settings: &Settings, request_id: Option<String>, repo: Option<String>, json: bool) -> Result<()> {
    let reports = Reports::new(open_store(settings)?);
    let report = match (request_id, repo) {
        (Some(id), _) => reports.by_request_id(&id)?,
        (None, Some(url)) => reports.by_repo_url(&url)?,
        (None, None) => bail!("Either --request-id or --repo is required"),
    };
    match report {
        Some(report) => output::print_reports(&[report], json),
        None => bail!("No analysis found"),
    }
}
