//! # waypoint-agent
//!
//! Replay binary: loads a page snapshot, starts an assistant against the
//! configured backend, plays a scripted visitor session and prints every
//! assistant event as a JSON line on stdout.

#![deny(unsafe_code)]

mod script;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use waypoint_core::SessionId;
use waypoint_core::logging::{init_json_subscriber, init_subscriber};
use waypoint_dom::MemoryDocument;
use waypoint_runtime::{
    AssistantStatus, AutoAssistant, HistoryBackend, HistoryNavigation, MemoryRenderer,
};
use waypoint_settings::{AssistantSettings, load_settings_from_path};

use crate::script::{Replay, Step, load_script};

/// Waypoint replay agent.
#[derive(Parser, Debug)]
#[command(name = "waypoint-agent", about = "Replay a visitor session against a Waypoint backend")]
struct Cli {
    /// HTML snapshot of the host page.
    #[arg(long)]
    page: PathBuf,

    /// URL the snapshot was taken at.
    #[arg(long, default_value = "http://localhost/")]
    url: String,

    /// JSON script of visitor steps.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Settings file (JSON, merged over defaults).
    #[arg(long, default_value = "waypoint.json")]
    settings: PathBuf,

    /// Site id (overrides settings).
    #[arg(long)]
    site_id: Option<String>,

    /// Session id (overrides settings; generated when absent everywhere).
    #[arg(long)]
    session_id: Option<String>,

    /// Backend base URL (overrides settings).
    #[arg(long)]
    api_base_url: Option<String>,

    /// How long to keep listening after the last step.
    #[arg(long, default_value = "2000")]
    linger_ms: u64,
}

impl Cli {
    fn resolve_settings(&self) -> Result<AssistantSettings> {
        let mut settings = load_settings_from_path(&self.settings)
            .with_context(|| format!("failed to load settings: {}", self.settings.display()))?;
        if let Some(site_id) = &self.site_id {
            settings.site_id.clone_from(site_id);
        }
        if let Some(session_id) = &self.session_id {
            settings.session_id.clone_from(session_id);
        }
        if let Some(url) = &self.api_base_url {
            settings.api_base_url.clone_from(url);
        }
        if settings.session_id.is_empty() {
            settings.session_id = SessionId::new().into_inner();
        }
        Ok(settings)
    }
}

/// Run one session and return the final status.
async fn run(
    settings: AssistantSettings,
    html: &str,
    url: &str,
    steps: &[Step],
    linger: Duration,
) -> Result<AssistantStatus> {
    let doc = Arc::new(MemoryDocument::parse(html, url));
    let nav = Arc::new(HistoryNavigation::new(
        Arc::clone(&doc) as Arc<dyn HistoryBackend>
    ));
    let renderer = Arc::new(MemoryRenderer::new());

    let handle = AutoAssistant::builder(settings)
        .document(doc.clone())
        .navigation(nav.clone())
        .renderer(renderer.clone())
        .on_event(|event| match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to encode event"),
        })
        .start()
        .context("failed to start assistant")?;

    let replay = Replay {
        doc,
        nav,
        renderer,
        handle: handle.clone(),
    };
    let outcome = replay.run(steps).await;
    if outcome.is_ok() {
        tokio::time::sleep(linger).await;
    }
    let status = handle.status().await;
    handle.stop().await;
    outcome?;
    Ok(status?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;
    if settings.log_json {
        init_json_subscriber(&settings.log_level);
    } else {
        init_subscriber(&settings.log_level);
    }

    let html = std::fs::read_to_string(&cli.page)
        .with_context(|| format!("failed to read page: {}", cli.page.display()))?;
    let steps = match &cli.script {
        Some(path) => load_script(path)?,
        None => Vec::new(),
    };
    info!(
        site_id = %settings.site_id,
        api = %settings.api_base_url,
        steps = steps.len(),
        "starting replay"
    );

    let linger = Duration::from_millis(cli.linger_ms);
    let status = tokio::select! {
        status = run(settings, &html, &cli.url, &steps, linger) => status?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            return Ok(());
        }
    };
    println!("{}", serde_json::to_string(&status)?);
    Ok(())
}
