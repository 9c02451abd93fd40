//! Command-line interface for roomscribe.
//!
//! Provides commands for running the webhook server with its queue workers,
//! inspecting and cleaning jobs, and showing the resolved configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use crate::adapters::{
    GoogleSpeechClient, LiveKitClient, MediaPlatform, ObjectStorage, S3Storage, SpeechTranscriber,
};
use crate::api::{self, AppState, RoomDefaults};
use crate::config::{self, ResolvedConfig};
use crate::notify::{LogEmailSender, NotificationRepository, NotificationService};
use crate::processors::{CaptureProcessor, NotificationProcessor, TranscriptionProcessor};
use crate::queue::{JobService, QueueName, WorkerSet};
use crate::store::Store;
use crate::transcription::TranscribeOptions;
use crate::webhooks::WebhookVerifier;

/// roomscribe - Recording and transcription pipeline for media rooms
#[derive(Parser, Debug)]
#[command(name = "roomscribe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server and the queue workers
    Serve {
        /// Address to bind to (overrides config)
        #[arg(short, long, env = "ROOMSCRIBE_BIND")]
        bind: Option<String>,
    },

    /// Inspect and maintain queued jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommands {
    /// Show the status of a capture or transcription job
    Status {
        /// Job ID
        job_id: String,
    },

    /// Remove finished jobs from every queue
    Clean {
        /// Only remove jobs finished more than this many seconds ago
        #[arg(long, default_value = "0")]
        grace_secs: u64,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve { bind } => serve(bind).await,
            Commands::Jobs { command } => match command {
                JobsCommands::Status { job_id } => show_job_status(&job_id).await,
                JobsCommands::Clean { grace_secs } => clean_jobs(grace_secs).await,
            },
            Commands::Config => show_config(),
        }
    }
}

/// Open the state store and the queues on its connection
async fn open_state(cfg: &ResolvedConfig) -> Result<(Store, JobService)> {
    let store = Store::open(&cfg.database_path).with_context(|| {
        format!("Failed to open database: {}", cfg.database_path.display())
    })?;
    let jobs = JobService::open(store.connection(), &cfg.queue)
        .await
        .context("Failed to open job queues")?;
    Ok((store, jobs))
}

/// Run the server until Ctrl-C, then drain the workers
async fn serve(bind: Option<String>) -> Result<()> {
    let cfg = config::load_config()?;
    let (store, jobs) = open_state(&cfg).await?;

    if cfg.livekit.api_key.is_empty() || cfg.livekit.api_secret.is_empty() {
        warn!("LiveKit API key or secret not set; every webhook will be rejected");
    }

    let platform: Arc<dyn MediaPlatform> = Arc::new(
        LiveKitClient::new(cfg.livekit.clone(), &cfg.storage)
            .context("Failed to create media platform client")?,
    );
    let storage: Arc<dyn ObjectStorage> = Arc::new(S3Storage::new(cfg.storage.clone()));
    let transcriber: Arc<dyn SpeechTranscriber> = Arc::new(
        GoogleSpeechClient::new(cfg.speech.clone()).context("Failed to create speech client")?,
    );
    let in_app: Arc<dyn NotificationRepository> = Arc::new(store.clone());
    let notifier = NotificationService::new(Arc::new(LogEmailSender), in_app.clone());

    let poll_interval = Duration::from_millis(cfg.queue.poll_interval_ms);
    let mut workers = WorkerSet::new();
    workers.spawn(
        jobs.queue(QueueName::Capture).clone(),
        Arc::new(CaptureProcessor::new(
            store.clone(),
            platform.clone(),
            jobs.clone(),
        )),
        poll_interval,
    );
    workers.spawn(
        jobs.queue(QueueName::Transcription).clone(),
        Arc::new(TranscriptionProcessor::new(
            store.clone(),
            storage,
            transcriber,
            jobs.clone(),
            TranscribeOptions::from_config(&cfg.speech),
        )),
        poll_interval,
    );
    workers.spawn(
        jobs.queue(QueueName::Notification).clone(),
        Arc::new(NotificationProcessor::new(store.clone(), notifier)),
        poll_interval,
    );

    let state = AppState::new(
        store,
        jobs,
        platform,
        WebhookVerifier::new(&cfg.livekit.api_key, &cfg.livekit.api_secret),
        in_app,
        RoomDefaults::from(&cfg.livekit),
    );
    let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());

    let result = api::serve(state, &bind, shutdown_signal()).await;

    info!("Draining queue workers");
    workers.shutdown().await;
    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}

/// Print the status of one job
async fn show_job_status(job_id: &str) -> Result<()> {
    let cfg = config::load_config()?;
    let (_, jobs) = open_state(&cfg).await?;

    let Some(status) = jobs.find_job_status(job_id).await? else {
        anyhow::bail!("Job {} not found", job_id);
    };

    println!("Job ID:    {}", status.id);
    println!("Name:      {}", status.name);
    println!("State:     {}", status.state.as_str());
    println!("Attempts:  {}", status.attempts_made);
    if let Some(reason) = &status.failed_reason {
        println!("Failed:    {}", reason);
    }
    if let Some(progress) = &status.progress {
        println!("Progress:  {}", progress);
    }
    println!("Data:");
    println!("{}", serde_json::to_string_pretty(&status.data)?);

    Ok(())
}

/// Remove completed and failed jobs past the grace period
async fn clean_jobs(grace_secs: u64) -> Result<()> {
    let cfg = config::load_config()?;
    let (_, jobs) = open_state(&cfg).await?;

    let removed = jobs.clean_queues(Duration::from_secs(grace_secs)).await?;
    println!("Removed {} finished job(s)", removed);
    Ok(())
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(not set)"
    } else {
        "********"
    }
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::load_config()?;

    println!("roomscribe configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database_path.display());
    println!();
    println!("Server:");
    println!("  Bind: {}", cfg.server.bind);
    println!();
    println!("LiveKit:");
    println!("  URL:        {}", cfg.livekit.url);
    println!("  API key:    {}", cfg.livekit.api_key);
    println!("  API secret: {}", mask(&cfg.livekit.api_secret));
    println!("  Token TTL:  {}s", cfg.livekit.token_ttl_secs);
    println!();
    println!("Storage:");
    println!("  Bucket:     {}", cfg.storage.bucket);
    println!("  Region:     {}", cfg.storage.region);
    println!(
        "  Endpoint:   {}",
        cfg.storage.endpoint.as_deref().unwrap_or("(AWS)")
    );
    println!("  Access key: {}", mask(&cfg.storage.access_key_id));
    println!("  URL expiry: {}s", cfg.storage.signed_url_expiry_secs);
    println!();
    println!("Speech:");
    println!("  Endpoint: {}", cfg.speech.endpoint);
    println!("  API key:  {}", mask(&cfg.speech.api_key));
    println!("  Language: {}", cfg.speech.language_code);
    println!("  Model:    {}", cfg.speech.model);
    println!();
    println!("Queues:");
    println!("  Attempts:            {}", cfg.queue.retry.max_attempts);
    println!("  Initial backoff:     {}ms", cfg.queue.retry.initial_delay_ms);
    println!("  Transcription delay: {}ms", cfg.queue.transcription_delay_ms);
    println!(
        "  Retention:           {} completed / {} failed",
        cfg.queue.retention.keep_completed, cfg.queue.retention.keep_failed
    );

    Ok(())
}
