//! Offline replay: runs a detection session over a recorded keypoint trace.
//!
//! Trace format is JSONL, one frame per line:
//!   {"t_us": 0, "w": 1280, "h": 720, "kp": [[4, 0.5, 0.55, 0.9], ...]}
//!
//! Usage:
//!   trace_replay <exercise> <trace.jsonl> [config.toml]

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use taiso_meter::config::Config;
use taiso_meter::detect::RepEvent;
use taiso_meter::error::SourceError;
use taiso_meter::pose::{Frame, Keypoint, LandmarkId, Pose};
use taiso_meter::runner::{Controller, FrameInput, FrameSource};
use taiso_meter::session::{ExerciseKind, Session, StartParams};
use taiso_meter::sink::{CsvLogger, EventSink};

#[derive(Debug, Deserialize)]
struct TraceRecord {
    t_us: u64,
    w: u32,
    h: u32,
    kp: Vec<(u8, f32, f32, f32)>,
}

/// JSONLトレースを1行ずつFrameにして流すソース
struct JsonlSource {
    reader: BufReader<File>,
    line: u64,
}

impl JsonlSource {
    fn open(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open trace {path}"))?;
        Ok(Self {
            reader: BufReader::new(file),
            line: 0,
        })
    }
}

impl FrameSource for JsonlSource {
    fn next_input(&mut self) -> Result<Option<FrameInput>, SourceError> {
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = self
                .reader
                .read_line(&mut buf)
                .map_err(|e| SourceError::ResourceUnavailable(e.to_string()))?;
            if n == 0 {
                return Ok(None);
            }
            self.line += 1;
            if buf.trim().is_empty() {
                continue;
            }
            let record: TraceRecord = serde_json::from_str(buf.trim())
                .map_err(|e| SourceError::Decode(format!("line {}: {}", self.line, e)))?;

            let mut pose = Pose::default();
            for (index, x, y, visibility) in record.kp {
                if let Some(id) = LandmarkId::from_index(index as usize) {
                    pose.set(id, Keypoint::new(x, y, visibility));
                }
            }
            let frame = Frame::new(
                record.w,
                record.h,
                Duration::from_micros(record.t_us),
                pose,
            );
            return Ok(Some(FrameInput::keypoints_only(frame)));
        }
    }
}

/// イベントを標準出力へ流すシンク
struct PrintSink;

impl EventSink for PrintSink {
    fn emit(&mut self, event: &RepEvent) -> Result<()> {
        println!(
            "[{:8.3}s] rep: {:.2}{}",
            event.timestamp.as_secs_f64(),
            event.magnitude,
            if event.suspect { " (suspect)" } else { "" }
        );
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <exercise> <trace.jsonl> [config.toml]", args[0]);
        eprintln!("  exercise: vertical_jump | squat | sit_up | sit_and_reach");
        std::process::exit(1);
    }

    let exercise = ExerciseKind::from_name(&args[1])
        .with_context(|| format!("unknown exercise: {}", args[1]))?;
    let source = JsonlSource::open(&args[2])?;
    let config = match args.get(3) {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default("config.toml"),
    };

    let mut session = Session::new(exercise, &config, StartParams::default())?;
    session.add_sink(Box::new(PrintSink));
    if config.output.csv_enabled {
        session.add_sink(Box::new(CsvLogger::create(&config.output.csv_path)?));
    }

    println!("Replaying {} as {}", args[2], exercise.name());

    let controller = Controller::new();
    controller.start(session, source)?;
    controller.join();

    match controller.status() {
        Some(status) => {
            println!();
            println!("Status: {}", status.message);
            println!("Reps:   {}", status.counters.rep_count);
            println!("Last:   {:.2}", status.counters.last_magnitude);
            println!("Max:    {:.2}", status.counters.max_magnitude);
        }
        None => println!("No frames processed."),
    }
    Ok(())
}
