use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bulkfetch_core::auth::{DEFAULT_AUTH_TIMEOUT_SECS, DEFAULT_PROBE_URL};
use bulkfetch_core::download::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use bulkfetch_core::progress::DEFAULT_PROGRESS_INTERVAL;
use bulkfetch_core::{
    AuthClient, CredentialStore, DownloadOrchestrator, HttpClient, NullProgress, ProgressSink,
    ResumableTransfer, parse_task_list,
};
use clap::Parser;
use tracing::{debug, info, warn};
use url::Url;

use crate::ProcessExit;
use crate::app::config::{self, FileConfig};
use crate::app::credentials::PromptCredentials;
use crate::app::progress::{ConsoleProgress, should_show_progress};
use crate::app::{input, summary, terminal};
use crate::cli::Args;

const DEFAULT_COOKIE_JAR: &str = "~/.bulk_download_cookiejar.txt";

pub(crate) async fn run_bulkfetch() -> Result<ProcessExit> {
    let args = Args::parse();
    let file_config = config::load_default_file_config()?;

    terminal::init_tracing(terminal::resolve_default_log_level(&args, &file_config));
    debug!(?args, "CLI arguments parsed");

    let Some(input_text) = input::read_task_input(&args)? else {
        print_quick_start_guidance();
        return Ok(ProcessExit::Success);
    };

    let task_list = parse_task_list(&input_text).context("Failed to parse task list")?;
    for (entry, reason) in &task_list.warnings {
        warn!(entry, reason = %reason, "Skipped task-list entry");
    }
    if task_list.entries.is_empty() {
        info!("No download tasks found in input");
        return Ok(ProcessExit::Success);
    }

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file_config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    if !output_dir.exists() {
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory '{}'", output_dir.display())
        })?;
        info!(dir = %output_dir.display(), "Created output directory");
    }
    let tasks = task_list.into_tasks(&output_dir);
    info!(tasks = tasks.len(), output_dir = %output_dir.display(), "Bulkfetch starting");

    let store = Arc::new(build_store(&args, &file_config));
    let orchestrator = build_orchestrator(&args, &file_config, Arc::clone(&store))?;
    let credentials =
        PromptCredentials::new(args.username.clone().or_else(|| file_config.username.clone()));

    let report = orchestrator.run(&tasks, &credentials).await;

    if let Err(error) = store.persist_if_changed() {
        warn!(error = %error, "Failed to save session cookies");
    }

    info!(
        completed = report.completed(),
        skipped = report.skipped(),
        failed = report.failed(),
        bytes = report.bytes_transferred(),
        "Bulkfetch finished"
    );
    print!("{}", summary::render_summary(&report));

    Ok(summary::determine_exit_outcome(
        report.completed() + report.skipped(),
        report.failed(),
    ))
}

fn build_store(args: &Args, file_config: &FileConfig) -> CredentialStore {
    if args.no_cookie_jar {
        debug!("cookie jar disabled; session kept in memory");
        return CredentialStore::new();
    }
    let path = args
        .cookie_jar
        .clone()
        .or_else(|| file_config.cookie_jar.clone())
        .unwrap_or_else(|| config::expand_home(DEFAULT_COOKIE_JAR));
    CredentialStore::with_cookie_file(path)
}

fn build_orchestrator(
    args: &Args,
    file_config: &FileConfig,
    store: Arc<CredentialStore>,
) -> Result<DownloadOrchestrator> {
    let probe_url = match args.probe_url.clone().or_else(|| file_config.probe_url.clone()) {
        Some(url) => url,
        None => Url::parse(DEFAULT_PROBE_URL).context("Invalid default probe URL")?,
    };
    let probe_timeout =
        Duration::from_secs(file_config.probe_timeout_secs.unwrap_or(DEFAULT_AUTH_TIMEOUT_SECS));
    let authenticator =
        AuthClient::new(probe_url, probe_timeout).context("Failed to build login client")?;

    let client = HttpClient::with_timeouts(
        Arc::clone(&store),
        file_config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        file_config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    )
    .context("Failed to build download client")?;

    let sink: Arc<dyn ProgressSink> = if should_show_progress(
        io::stderr().is_terminal() && !terminal::is_dumb_terminal(),
        args.quiet,
    ) {
        Arc::new(ConsoleProgress::new())
    } else {
        Arc::new(NullProgress)
    };
    let interval = file_config
        .progress_interval_ms
        .map_or(DEFAULT_PROGRESS_INTERVAL, Duration::from_millis);
    let transfer = ResumableTransfer::new(client).with_progress(sink, interval);

    Ok(DownloadOrchestrator::new(
        store,
        Arc::new(authenticator),
        Arc::new(transfer),
    ))
}

fn print_quick_start_guidance() {
    eprintln!("No download tasks provided.");
    eprintln!("  bulkfetch https://data.example.org/granule.h5");
    eprintln!("  bulkfetch -i tasks.txt -o ./data     (one `URL [MD5|SHA256]` per line)");
    eprintln!("  cat tasks.txt | bulkfetch");
}
