use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use lumos_common::{Config, TranscriptSegment};
use lumos_pipeline::chain::EvidenceProviderChain;
use lumos_pipeline::extractor::ClaimExtractor;
use lumos_pipeline::grouper::UserRateLimiter;
use lumos_pipeline::pipeline::PipelineOrchestrator;
use lumos_pipeline::providers::{
    CrossrefProvider, EvidenceProvider, OpenAlexProvider, SerperProvider,
};
use lumos_pipeline::store::{InMemoryStore, TracingSink};
use lumos_pipeline::verifier::ClaimVerifier;

#[derive(Parser)]
#[command(
    name = "lumos-pipeline",
    about = "Verify factual claims in a video transcript and print the resulting alerts"
)]
struct Args {
    /// JSON file holding an array of {text, start_time_seconds, end_time_seconds} segments.
    transcript: PathBuf,

    /// Video identifier used for claim ids and result caching.
    #[arg(long)]
    video_id: String,

    /// Current video duration in seconds, if known. Omitting it disables
    /// cache hits for this video.
    #[arg(long)]
    duration: Option<f64>,

    /// User to attribute alerts to. Random when omitted.
    #[arg(long)]
    user_id: Option<Uuid>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lumos_pipeline=info".parse()?)
                .add_directive("lumos_common=info".parse()?)
                .add_directive("evidence_client=info".parse()?),
        )
        .init();

    info!("Lumos pipeline starting...");

    let args = Args::parse();
    let config = Config::from_env();
    config.log_redacted();

    let raw = std::fs::read_to_string(&args.transcript)
        .with_context(|| format!("Failed to read {}", args.transcript.display()))?;
    let segments: Vec<TranscriptSegment> =
        serde_json::from_str(&raw).context("Transcript file is not a JSON array of segments")?;

    // Academic indexes first, generalized web search as the fallback.
    let mut providers: Vec<Arc<dyn EvidenceProvider>> = vec![
        Arc::new(OpenAlexProvider::new(&config.contact_email)),
        Arc::new(CrossrefProvider::new(&config.contact_email)),
    ];
    if config.serper_api_key.is_empty() {
        warn!("SERPER_API_KEY not set, skipping web-search fallback");
    } else {
        providers.push(Arc::new(SerperProvider::new(&config.serper_api_key)));
    }

    let chain = EvidenceProviderChain::new(
        providers,
        Duration::from_secs(config.provider_timeout_secs),
        config.provider_max_attempts,
        config.relevance_threshold,
    );
    let deadline =
        (config.run_deadline_secs > 0).then(|| Duration::from_secs(config.run_deadline_secs));

    let pipeline = PipelineOrchestrator::new(
        ClaimExtractor::new(),
        ClaimVerifier::new(chain),
        Arc::new(InMemoryStore::new()),
        Arc::new(TracingSink),
        Arc::new(UserRateLimiter::new()),
        config.verify_concurrency,
        deadline,
    );

    let user_id = args.user_id.unwrap_or_else(Uuid::new_v4);
    let alerts = pipeline
        .run(&args.video_id, args.duration, &segments, user_id)
        .await?;

    info!(count = alerts.len(), "Pipeline run finished");
    println!("{}", serde_json::to_string_pretty(&alerts)?);
    Ok(())
}
