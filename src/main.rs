//! Headless session runner
//!
//! Loads a content root, drives the session with a manual event loop and
//! prints the resulting state. Optionally attaches a recording renderer
//! partway through to show late attachment.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;

use rts_gamestate::core::error::Result;
use rts_gamestate::core::types::PlayerId;
use rts_gamestate::entity::EntitySnapshot;
use rts_gamestate::event::ManualEventLoop;
use rts_gamestate::game::Game;
use rts_gamestate::render::{RecordingRenderFactory, RenderFactory};
use rts_gamestate::state::Outcome;

/// Headless RTS session runner
#[derive(Parser, Debug)]
#[command(name = "rts-gamestate")]
#[command(about = "Run a data-driven RTS session without a renderer")]
struct Args {
    /// Content root containing modpack.toml and templates/
    #[arg(long, default_value = "data/skirmish")]
    root: String,

    /// Number of ticks to simulate
    #[arg(long, default_value_t = 60)]
    ticks: u32,

    /// Simulated milliseconds per tick
    #[arg(long, default_value_t = 250)]
    dt_ms: u64,

    /// Attach a recording renderer after this many ticks
    #[arg(long)]
    attach_at: Option<u32>,

    /// Print the final state as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct RunSummary {
    session: String,
    ticks: u64,
    elapsed_secs: f64,
    outcome: Outcome,
    scores: BTreeMap<PlayerId, i64>,
    diagnostics: u64,
    renderer_events: usize,
    entities: Vec<EntitySnapshot>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let dt = Duration::from_millis(args.dt_ms);

    let event_loop = Arc::new(ManualEventLoop::new());
    let game = Game::new(&args.root, event_loop.clone())?;

    let recorder = Arc::new(RecordingRenderFactory::with_terrain());
    for tick in 0..args.ticks {
        if args.attach_at == Some(tick) {
            let factory: Arc<dyn RenderFactory> = recorder.clone();
            let report = game.attach_renderer(Some(factory));
            tracing::info!("Recorder attached with {} connectors", report.created);
        }
        event_loop.advance(dt);
    }

    let summary = {
        let state = game.state().read();
        let meta = state.meta();
        RunSummary {
            session: game.state().id().to_string(),
            ticks: meta.ticks(),
            elapsed_secs: meta.elapsed().as_secs_f64(),
            outcome: meta.outcome(),
            scores: meta.scores().clone(),
            diagnostics: meta.diagnostics_total(),
            renderer_events: recorder.events().len(),
            entities: state.universe().world().snapshots(),
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::error!("Failed to serialize summary: {}", e),
        }
    } else {
        println!("\n=== SESSION {} ===", summary.session);
        println!(
            "{} ticks, {:.2}s simulated, outcome {:?}",
            summary.ticks, summary.elapsed_secs, summary.outcome
        );
        for (player, score) in &summary.scores {
            println!("  {}: {}", player, score);
        }
        println!("{} entities alive, {} diagnostics", summary.entities.len(), summary.diagnostics);
        if args.attach_at.is_some() {
            println!("{} renderer calls recorded", summary.renderer_events);
        }
    }

    Ok(())
}
