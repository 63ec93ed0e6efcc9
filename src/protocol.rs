//! TCP protocol for pose-estimator ↔ measurement-server communication.
//!
//! Self-contained: no imports from other taiso_meter modules.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// One landmark observation: (index, x_norm, y_norm, visibility)
pub type WireKeypoint = (u8, f32, f32, f32);

/// Estimator → Server
#[derive(Serialize, Deserialize, Debug)]
pub enum ClientMessage {
    Start {
        /// Exercise name ("vertical_jump" | "squat" | "sit_up" | "sit_and_reach")
        exercise: String,
        subject_height_cm: Option<f64>,
    },
    Stop,
    Reset,
    QueryStatus,
    Frame {
        width: u32,
        height: u32,
        timestamp_us: u64,
        keypoints: Vec<WireKeypoint>,
    },
}

/// Server → Estimator
#[derive(Serialize, Deserialize, Debug)]
pub enum ServerMessage {
    Ack {
        ok: bool,
        error: Option<String>,
    },
    Status {
        running: bool,
        rep_count: u64,
        last_magnitude: f64,
        max_magnitude: f64,
        message: String,
    },
    Rep {
        timestamp_us: u64,
        magnitude: f64,
        suspect: bool,
    },
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(1024 * 1024) // 1MB, keypoint packets are tiny
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message. `None` = connection closed.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<Option<T>> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_roundtrip() {
        let msg = ClientMessage::Frame {
            width: 1280,
            height: 720,
            timestamp_us: 123_456,
            keypoints: vec![(0, 0.5, 0.3, 0.9), (4, 0.7, 0.4, 0.8)],
        };
        let data = bincode::serialize(&msg).unwrap();
        let decoded: ClientMessage = bincode::deserialize(&data).unwrap();
        match decoded {
            ClientMessage::Frame {
                width,
                height,
                timestamp_us,
                keypoints,
            } => {
                assert_eq!(width, 1280);
                assert_eq!(height, 720);
                assert_eq!(timestamp_us, 123_456);
                assert_eq!(keypoints.len(), 2);
                assert_eq!(keypoints[1].0, 4);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_server_message_roundtrip() {
        let msg = ServerMessage::Rep {
            timestamp_us: 42,
            magnitude: 15.0,
            suspect: false,
        };
        let data = bincode::serialize(&msg).unwrap();
        let decoded: ServerMessage = bincode::deserialize(&data).unwrap();
        match decoded {
            ServerMessage::Rep {
                timestamp_us,
                magnitude,
                suspect,
            } => {
                assert_eq!(timestamp_us, 42);
                assert_eq!(magnitude, 15.0);
                assert!(!suspect);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
