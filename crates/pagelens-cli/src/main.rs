//! CLI binary: fetch pages and run the analysis pipeline over each.

mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use pagelens_llm::{
    ChatCompletionsAdapter, GenerationSettings, LlmClient, LoggingMiddleware,
    UsageTrackingMiddleware, GROQ_API_KEY_VAR, GROQ_BASE_URL, GROQ_DEFAULT_MODEL,
};
use pagelens_pipeline::{FailurePolicy, Pipeline, PipelineConfig, PipelineExecutor, RunReport};
use pagelens_scrape::{write_artifact, HttpFetcher, PageFetcher};
use pagelens_types::{PagelensError, Result};

#[derive(Parser)]
#[command(name = "pagelens", version, about = "Staged LLM analysis of web pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one or more pages and analyze each
    Analyze(AnalyzeArgs),

    /// List the stages of a pipeline definition
    Stages {
        /// Show the four-stage pipeline instead of the full one
        #[arg(long)]
        minimal: bool,
    },
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// Page URLs (http or https)
    #[arg(required = true)]
    urls: Vec<String>,

    /// Model identifier
    #[arg(long, env = "PAGELENS_MODEL", default_value = GROQ_DEFAULT_MODEL)]
    model: String,

    /// Base URL of the chat-completions endpoint
    #[arg(long, env = "PAGELENS_BASE_URL", default_value = GROQ_BASE_URL)]
    base_url: String,

    /// Sampling temperature (0.0 to 2.0)
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Per-request timeout for generation calls, in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Retries per generation call for transient failures
    #[arg(long, default_value_t = 2)]
    max_retries: usize,

    /// What to do when a stage fails: fail-fast, fail-soft or dependency-aware
    #[arg(long, default_value_t = FailurePolicy::DependencyAware)]
    policy: FailurePolicy,

    /// Run only classification, summary, tags and related topics
    #[arg(long)]
    minimal: bool,

    /// Directory for the scraped-text artifact of each page
    #[arg(long, default_value = ".")]
    artifact_dir: PathBuf,

    /// Do not write scraped-text artifacts
    #[arg(long)]
    no_artifact: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only results.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Analyze(args) => {
            let failed = cmd_analyze(args).await?;
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Stages { minimal } => {
            cmd_stages(minimal)?;
        }
    }

    Ok(())
}

fn load_pipeline(minimal: bool) -> Result<Pipeline> {
    if minimal {
        Pipeline::minimal()
    } else {
        Pipeline::standard()
    }
}

fn cmd_stages(minimal: bool) -> anyhow::Result<()> {
    let pipeline = load_pipeline(minimal)?;
    print!("{}", render::stage_table(&pipeline));
    Ok(())
}

/// Build the generation client from CLI settings and the environment.
fn build_client(args: &AnalyzeArgs) -> Result<(LlmClient, UsageTrackingMiddleware)> {
    if !(0.0..=2.0).contains(&args.temperature) {
        return Err(PagelensError::Other(format!(
            "temperature must be between 0.0 and 2.0, got {}",
            args.temperature
        )));
    }
    if args.timeout_secs == 0 {
        return Err(PagelensError::Other("timeout must be at least one second".into()));
    }

    let api_key = std::env::var(GROQ_API_KEY_VAR)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| PagelensError::MissingCredential {
            var: GROQ_API_KEY_VAR.to_string(),
        })?;

    let adapter = ChatCompletionsAdapter::new(api_key)
        .with_base_url(args.base_url.clone())
        .with_default_model(args.model.clone())
        .with_timeout(Duration::from_secs(args.timeout_secs));

    let usage = UsageTrackingMiddleware::new();
    let client = LlmClient::new(adapter)
        .with_middleware(LoggingMiddleware)
        .with_middleware(usage.clone())
        .with_settings(GenerationSettings {
            model: args.model.clone(),
            temperature: Some(args.temperature),
            max_retries: args.max_retries,
            ..GenerationSettings::default()
        });
    Ok((client, usage))
}

/// Analyze every URL concurrently; print results in input order.
///
/// Returns the number of URLs whose run failed or was aborted.
async fn cmd_analyze(args: AnalyzeArgs) -> anyhow::Result<usize> {
    let pipeline = load_pipeline(args.minimal)?;
    let (client, usage) = build_client(&args)?;

    let executor = Arc::new(
        PipelineExecutor::new(pipeline, Arc::new(client)).with_config(PipelineConfig {
            policy: args.policy,
        }),
    );
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new());
    let artifact_dir = (!args.no_artifact).then(|| args.artifact_dir.clone());

    tracing::info!(
        urls = args.urls.len(),
        stages = executor.pipeline().len(),
        policy = %args.policy,
        "Starting analysis"
    );

    let mut set = JoinSet::new();
    for (index, url) in args.urls.iter().cloned().enumerate() {
        let executor = executor.clone();
        let fetcher = fetcher.clone();
        let artifact_dir = artifact_dir.clone();
        set.spawn(async move {
            let result = analyze_url(&url, fetcher.as_ref(), &executor, artifact_dir.as_deref()).await;
            (index, url, result)
        });
    }

    let mut outcomes: Vec<Option<(String, Result<RunReport>)>> =
        (0..args.urls.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, url, result) = joined.context("analysis task panicked")?;
        outcomes[index] = Some((url, result));
    }

    let mut failed = 0;
    for (url, result) in outcomes.into_iter().flatten() {
        match result {
            Err(ref err) => {
                tracing::error!(url = %url, error = %err, "Analysis failed");
                failed += 1;
            }
            Ok(RunReport {
                aborted: Some(ref cause),
                ..
            }) => {
                tracing::error!(url = %url, stage = %cause.stage, error = %cause.message, "Analysis aborted");
                failed += 1;
            }
            Ok(_) => {}
        }
        match args.format {
            OutputFormat::Text => print!("{}", render::text(&url, &result)),
            OutputFormat::Json => println!("{}", render::json(&url, &result)?),
        }
    }

    tracing::info!(
        requests = usage.requests(),
        input_tokens = usage.total_input_tokens(),
        output_tokens = usage.total_output_tokens(),
        failed,
        "Analysis finished"
    );
    Ok(failed)
}

/// Fetch, save the artifact, then run the pipeline for one URL.
async fn analyze_url(
    url: &str,
    fetcher: &dyn PageFetcher,
    executor: &PipelineExecutor,
    artifact_dir: Option<&Path>,
) -> Result<RunReport> {
    let text = fetcher.fetch(url).await?;

    if let Some(dir) = artifact_dir {
        match write_artifact(dir, url, &text) {
            Ok(path) => tracing::info!(url, path = %path.display(), "Saved scraped text"),
            Err(err) => tracing::warn!(url, error = %err, "Could not save scraped text"),
        }
    }

    executor.run_page(url, &text).await
}
