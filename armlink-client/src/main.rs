use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use armlink_core::control::ControlLoop;
use armlink_core::input::{JsonLinesSampler, SampleMode};
use armlink_core::models::TeleopConfig;
use armlink_core::sinks::{FileFrameSink, LogFrameSink};
use armlink_core::tasks::status_report::spawn_status_report_task;
use armlink_core::traits::{FrameSink, PoseSampler};

#[derive(Parser, Debug, Clone)]
#[command(name = "armlink")]
#[command(author, version, about = "ArmLink - drive a robot arm from a tracked VR controller")]
struct Args {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// WebSocket URL of the arm, e.g. ws://192.168.4.1/ws
    #[arg(long)]
    arm_url: Option<String>,

    /// HTTP URL returning a camera frame, e.g. http://192.168.4.1/camera
    #[arg(long)]
    camera_url: Option<String>,

    /// Pose samples as JSON lines; "-" reads stdin.
    #[arg(long, default_value = "-")]
    input: String,

    /// Consume one recorded sample per tick instead of jumping to the newest.
    #[arg(long, default_value = "false")]
    replay: bool,

    /// Write each camera frame to this PNG path. Frames are only logged otherwise.
    #[arg(long)]
    frame_out: Option<PathBuf>,

    #[arg(long)]
    tick_ms: Option<u64>,

    #[arg(long)]
    poll_ms: Option<u64>,

    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    #[arg(long)]
    fetch_timeout_ms: Option<u64>,

    /// Command units per metre of controller travel.
    #[arg(long)]
    gain: Option<f64>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<TeleopConfig> {
        let mut cfg = match &self.config {
            Some(path) => TeleopConfig::from_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => TeleopConfig::default(),
        };

        if let Some(url) = self.arm_url {
            cfg.arm_url = url;
        }
        if let Some(url) = self.camera_url {
            cfg.camera_url = url;
        }
        if let Some(ms) = self.tick_ms {
            cfg.tick_interval_ms = ms;
        }
        if let Some(ms) = self.poll_ms {
            cfg.poll_interval_ms = ms;
        }
        if self.connect_timeout_ms.is_some() {
            cfg.connect_timeout_ms = self.connect_timeout_ms;
        }
        if self.fetch_timeout_ms.is_some() {
            cfg.fetch_timeout_ms = self.fetch_timeout_ms;
        }
        if let Some(gain) = self.gain {
            cfg.command_gain = gain;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("armlink=info".parse()?);
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let args = Args::parse();
    let input = args.input.clone();
    let mode = if args.replay { SampleMode::Sequential } else { SampleMode::Latest };
    let frame_out = args.frame_out.clone();
    let config = args.into_config()?;

    info!(
        "ArmLink starting. arm={}, camera={}, tick={:?}",
        config.arm_url,
        config.camera_url,
        config.tick_interval()
    );

    let sampler: Box<dyn PoseSampler> = if input == "-" {
        Box::new(JsonLinesSampler::stdin(mode))
    } else {
        Box::new(JsonLinesSampler::open(&input, mode).await?)
    };

    let sink: Arc<dyn FrameSink> = match frame_out {
        Some(path) => Arc::new(FileFrameSink::new(path)),
        None => Arc::new(LogFrameSink),
    };

    let control = ControlLoop::from_config(&config, sampler, Some(sink))?;
    let reporter = spawn_status_report_task(control.status_handle(), config.status_interval());

    let result = control
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    reporter.abort();
    result?;
    info!("ArmLink stopped.");
    Ok(())
}
