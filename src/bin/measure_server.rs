//! Measurement server: receives per-frame keypoints over TCP, runs the
//! detection core, and answers control messages (start/stop/reset/status).
//! Rep events are pushed back to the client and into the configured sinks.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};

use taiso_meter::config::Config;
use taiso_meter::pose::{Frame, Keypoint, LandmarkId, Pose};
use taiso_meter::protocol::{self, ClientMessage, ServerMessage, WireKeypoint};
use taiso_meter::session::{ExerciseKind, Session, StartParams, StatusSnapshot};
use taiso_meter::sink::{CsvLogger, OscNotifier};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let config = Config::load_or_default(CONFIG_PATH);

    println!("=== Taiso Meter - Measurement Server ===");
    println!("Listen: {}", config.server.listen_addr);
    println!("CSV output: {} ({})", config.output.csv_path,
        if config.output.csv_enabled { "on" } else { "off" });
    println!("OSC notify: {} ({})", config.notify.addr,
        if config.notify.enabled { "on" } else { "off" });
    println!();

    let listener = TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_addr))?;

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("client connected: {peer}");
        if let Err(e) = handle_client(stream, &config).await {
            warn!("client {peer} ended with error: {e:#}");
        }
        info!("client disconnected: {peer}");
    }
}

async fn handle_client(stream: TcpStream, config: &Config) -> Result<()> {
    let mut stream = protocol::message_stream(stream);
    let mut session: Option<Session> = None;

    while let Some(msg) = protocol::recv_message::<ClientMessage>(&mut stream).await? {
        match msg {
            ClientMessage::Start {
                exercise,
                subject_height_cm,
            } => {
                let reply = start_session(&mut session, config, &exercise, subject_height_cm);
                protocol::send_message(&mut stream, &reply).await?;
            }
            ClientMessage::Stop => {
                let reply = match session.take() {
                    Some(mut s) => {
                        s.finalize();
                        info!("session stopped: {}", s.exercise().name());
                        ServerMessage::Ack { ok: true, error: None }
                    }
                    None => ServerMessage::Ack {
                        ok: false,
                        error: Some("no session is running".to_string()),
                    },
                };
                protocol::send_message(&mut stream, &reply).await?;
            }
            ClientMessage::Reset => {
                let reply = match session.as_mut() {
                    Some(s) => {
                        s.reset();
                        ServerMessage::Ack { ok: true, error: None }
                    }
                    None => ServerMessage::Ack {
                        ok: false,
                        error: Some("no session is running".to_string()),
                    },
                };
                protocol::send_message(&mut stream, &reply).await?;
            }
            ClientMessage::QueryStatus => {
                let reply = status_message(session.as_ref());
                protocol::send_message(&mut stream, &reply).await?;
            }
            ClientMessage::Frame {
                width,
                height,
                timestamp_us,
                keypoints,
            } => {
                if let Some(s) = session.as_mut() {
                    let frame = decode_frame(width, height, timestamp_us, &keypoints);
                    if let Some(event) = s.step(&frame, None) {
                        let reply = ServerMessage::Rep {
                            timestamp_us: event.timestamp.as_micros() as u64,
                            magnitude: event.magnitude,
                            suspect: event.suspect,
                        };
                        protocol::send_message(&mut stream, &reply).await?;
                    }
                }
            }
        }
    }

    if let Some(mut s) = session.take() {
        s.finalize();
    }
    Ok(())
}

fn start_session(
    session: &mut Option<Session>,
    config: &Config,
    exercise: &str,
    subject_height_cm: Option<f64>,
) -> ServerMessage {
    if session.is_some() {
        return ServerMessage::Ack {
            ok: false,
            error: Some("a session is already running".to_string()),
        };
    }
    let Some(kind) = ExerciseKind::from_name(exercise) else {
        return ServerMessage::Ack {
            ok: false,
            error: Some(format!("unknown exercise: {exercise}")),
        };
    };

    let params = StartParams { subject_height_cm };
    match Session::new(kind, config, params) {
        Ok(mut s) => {
            if config.output.csv_enabled {
                match CsvLogger::create(&config.output.csv_path) {
                    Ok(logger) => s.add_sink(Box::new(logger)),
                    Err(e) => warn!("csv logger unavailable: {e:#}"),
                }
            }
            if config.notify.enabled {
                match OscNotifier::new(&config.notify.addr) {
                    Ok(notifier) => s.add_sink(Box::new(notifier)),
                    Err(e) => warn!("osc notifier unavailable: {e:#}"),
                }
            }
            info!("session started: {}", kind.name());
            *session = Some(s);
            ServerMessage::Ack { ok: true, error: None }
        }
        Err(e) => ServerMessage::Ack {
            ok: false,
            error: Some(format!("{e:#}")),
        },
    }
}

fn status_message(session: Option<&Session>) -> ServerMessage {
    match session {
        Some(s) => {
            let StatusSnapshot {
                running: _,
                exercise: _,
                counters,
                message,
            } = s.snapshot(true);
            ServerMessage::Status {
                running: true,
                rep_count: counters.rep_count,
                last_magnitude: counters.last_magnitude,
                max_magnitude: counters.max_magnitude,
                message,
            }
        }
        None => ServerMessage::Status {
            running: false,
            rep_count: 0,
            last_magnitude: 0.0,
            max_magnitude: 0.0,
            message: "Waiting to start...".to_string(),
        },
    }
}

fn decode_frame(width: u32, height: u32, timestamp_us: u64, keypoints: &[WireKeypoint]) -> Frame {
    let mut pose = Pose::default();
    for &(index, x, y, visibility) in keypoints {
        if let Some(id) = LandmarkId::from_index(index as usize) {
            pose.set(id, Keypoint::new(x, y, visibility));
        }
    }
    Frame::new(width, height, Duration::from_micros(timestamp_us), pose)
}
