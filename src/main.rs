// src/main.rs
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::info;

use hand_instrument::config::AppConfig;
use hand_instrument::landmarks::CameraPose;
use hand_instrument::output::{HeadlessOutputs, ParameterTable, SessionRecorder};
use hand_instrument::sensor::{ReplaySensor, SensorClient, SimulatedSensor};
use hand_instrument::service::HandService;

#[derive(Parser, Debug)]
#[command(name = "hand_instrument", about = "Play an instrument with tracked hands")]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay recorded frames (JSON lines) instead of the simulated sensor
    #[arg(long)]
    replay: Option<PathBuf>,

    #[arg(long, default_value_t = 20.0)]
    duration_secs: f64,

    /// Export per-tick parameters as CSV when done
    #[arg(long)]
    record: bool,

    /// Status queries the simulated sensor answers with "not calibrated"
    #[arg(long, default_value_t = 5)]
    calibration_queries: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    match &args.replay {
        Some(path) => run(ReplaySensor::new(path), &config, &args).await,
        None => {
            let sensor = SimulatedSensor::new(config.sensor_rate_hz, args.calibration_queries);
            run(sensor, &config, &args).await
        }
    }
}

async fn run<S: SensorClient>(sensor: S, config: &AppConfig, args: &Args) -> Result<()> {
    let mut outputs = HeadlessOutputs;
    let mut service =
        HandService::new(sensor, config, &mut outputs).context("Failed to open hand sensor")?;

    // Wait for calibration
    let retry = Duration::from_millis(config.calibration_retry_ms);
    while !service.try_start()? {
        sleep(retry).await;
    }

    let camera = CameraPose::identity();
    let mut mixer = ParameterTable::new();
    let mut recorder = (args.record || config.record_session)
        .then(|| SessionRecorder::new(&config.output_dir, None));

    // Sensor and render ticks share this task, so they never overlap
    let mut sensor_tick = interval(Duration::from_secs_f64(1.0 / config.sensor_rate_hz as f64));
    let mut render_tick = interval(Duration::from_secs_f64(1.0 / config.target_frame_rate as f64));
    sensor_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    render_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let start = Instant::now();
    let deadline = sleep(Duration::from_secs_f64(args.duration_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = sensor_tick.tick() => {
                service.poll(&camera, start.elapsed().as_secs_f64());
                if service.sensor().is_finished() {
                    info!("Sensor has no more frames");
                    break;
                }
            }
            _ = render_tick.tick() => {
                let snapshots = service.update_instruments(&camera, &mut mixer);
                if let Some(recorder) = recorder.as_mut() {
                    recorder.record_tick(start.elapsed().as_secs_f64(), &snapshots);
                }
            }
        }
    }

    service.shutdown();
    let stats = service.stats();
    info!(
        "{} frames, {} hands decoded, {} appearances, {} disappearances, {} surplus dropped",
        stats.frames, stats.decoded_hands, stats.appearances, stats.disappearances, stats.surplus_dropped
    );

    if let Some(recorder) = recorder {
        let csv_path = recorder.export_csv().context("Failed to export parameters")?;
        let summary_path = recorder.export_summary(stats)?;
        info!("Session written to {} and {}", csv_path.display(), summary_path.display());
    }

    Ok(())
}
