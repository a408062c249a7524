use anyhow::Context;
use clap::Parser;
use gui_bridge::bridge;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::{Scenario, SourceConfig, StationConfig};
use workflow::runner::Runner;

#[cfg(feature = "camera")]
mod camera;
mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Panel light-check station")]
struct Args {
    /// Load a station config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Layout to test
    #[arg(long, default_value = "CILOW")]
    layout: String,
    /// Position store file
    #[arg(long, default_value = "positions.json")]
    store: PathBuf,
    /// Replay frames from this directory instead of the synthetic panel
    #[arg(long)]
    frames: Option<PathBuf>,
    /// Capture from this V4L device (needs the `camera` feature)
    #[arg(long, conflicts_with = "frames")]
    camera: Option<String>,
    /// Number of synthetic frames to generate in a single run
    #[arg(long, default_value_t = 30)]
    frame_limit: usize,
    /// Run once over the frame source and print a summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Keep the HTTP control bridge alive
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn source_from_args(args: &Args) -> SourceConfig {
    if let Some(dir) = &args.frames {
        SourceConfig::Images {
            dir: dir.clone(),
            repeat: args.serve,
        }
    } else if let Some(device) = &args.camera {
        SourceConfig::Camera {
            device: device.clone(),
            resolution: (1280, 720),
        }
    } else {
        SourceConfig::Synthetic {
            scenario: Scenario::Pass,
            warmup_frames: 5,
            frame_limit: (!args.serve).then_some(args.frame_limit),
            seed: 0,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let station_config = if let Some(path) = &args.config {
        StationConfig::load(path)?
    } else {
        StationConfig::from_args(&args.layout, args.store.clone(), source_from_args(&args))
    };
    let bind = station_config.bind;
    let layout = station_config.layout.clone();

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating runtime")?;
    let runner = Arc::new(Runner::new(station_config, runtime.handle().clone())?);

    if args.offline {
        runner.start_detection(&layout)?;
        let summary = runner.wait().unwrap_or_default();
        let status = runner.status();
        println!(
            "Offline run {} -> frames {}, passes {}, wrong-color events {}",
            layout, summary.frames, summary.passes, summary.failures
        );
        for light in &status.lights {
            let state = if light.success {
                "Success"
            } else if light.wrong {
                "Failed"
            } else {
                "--"
            };
            println!("  {}: {}", light.label, state);
        }
    }

    if args.serve {
        if !args.offline {
            runner.start_detection(&layout)?;
        }
        println!("HTTP bridge on {} (Ctrl+C to stop)...", bind);
        runtime.block_on(bridge::serve(runner.clone(), bind, async {
            if let Err(err) = signal::ctrl_c().await {
                log::warn!("awaiting Ctrl+C failed: {}", err);
            }
        }));
        runner.stop_detection();
    }

    Ok(())
}
