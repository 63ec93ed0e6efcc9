//! RepEventの出力先。
//!
//! コアはイベントをシンクに押し込むだけで、トランスポートの選択
//! （UDP/OSC・ファイル・プロセス内チャネル）はここに閉じる。

use anyhow::Result;
use chrono::Local;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::fs::File;
use std::io::Write;
use std::net::UdpSocket;
use std::path::Path;

use crate::detect::RepEvent;

/// OSC通知のデフォルト送信先
pub const NOTIFY_DEFAULT_ADDR: &str = "127.0.0.1:39600";

/// イベント受け口
pub trait EventSink: Send {
    fn emit(&mut self, event: &RepEvent) -> Result<()>;

    /// セッション終了時のフラッシュ
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// レップ通知のOSCメッセージを構築
/// 引数: magnitude, suspect(0/1)
pub fn build_rep_message(event: &RepEvent) -> OscMessage {
    OscMessage {
        addr: "/taiso/rep".to_string(),
        args: vec![
            OscType::Float(event.magnitude as f32),
            OscType::Int(event.suspect as i32),
        ],
    }
}

/// OSCメッセージをバイト列にエンコード
pub fn encode_rep_message(msg: &OscMessage) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(msg.clone());
    let encoded = encoder::encode(&packet)?;
    Ok(encoded)
}

/// イベントごとのfire-and-forget UDP/OSC通知
///
/// 元のシステムが別プロセスのカウンタへ増分POSTしていた役割。
/// 到達保証はしない。
pub struct OscNotifier {
    socket: UdpSocket,
    target_addr: String,
}

impl OscNotifier {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }

    pub fn default_target() -> Result<Self> {
        Self::new(NOTIFY_DEFAULT_ADDR)
    }
}

impl EventSink for OscNotifier {
    fn emit(&mut self, event: &RepEvent) -> Result<()> {
        let msg = build_rep_message(event);
        let data = encode_rep_message(&msg)?;
        self.socket.send_to(&data, &self.target_addr)?;
        Ok(())
    }
}

/// 1レップ1行のCSVロガー
///
/// セッションごとに1ファイル、開始時に切り詰める。
/// 行: 人間可読タイムスタンプ, 小数2桁のmagnitude
pub struct CsvLogger<W: Write + Send> {
    writer: csv::Writer<W>,
}

impl CsvLogger<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Self::from_writer(file)
    }
}

impl<W: Write + Send> CsvLogger<W> {
    pub fn from_writer(writer: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(["timestamp", "magnitude"])?;
        Ok(Self { writer })
    }

    fn write_event(&mut self, event: &RepEvent) -> Result<()> {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.writer
            .write_record([stamp, format!("{:.2}", event.magnitude)])?;
        // 1行ずつ確定させる（途中でセッションが落ちても残す）
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> EventSink for CsvLogger<W> {
    fn emit(&mut self, event: &RepEvent) -> Result<()> {
        self.write_event(event)
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(magnitude: f64, suspect: bool) -> RepEvent {
        RepEvent {
            timestamp: Duration::from_millis(500),
            magnitude,
            suspect,
        }
    }

    #[test]
    fn test_build_rep_message_address() {
        let msg = build_rep_message(&event(15.0, false));
        assert_eq!(msg.addr, "/taiso/rep");
    }

    #[test]
    fn test_build_rep_message_args() {
        let msg = build_rep_message(&event(42.5, true));
        assert_eq!(msg.args.len(), 2);
        assert_eq!(msg.args[0], OscType::Float(42.5));
        assert_eq!(msg.args[1], OscType::Int(1));
    }

    #[test]
    fn test_encode_rep_message() {
        let msg = build_rep_message(&event(15.0, false));
        let encoded = encode_rep_message(&msg).unwrap();
        assert!(!encoded.is_empty());
    }

    #[test]
    fn test_csv_rows() {
        let mut logger = CsvLogger::from_writer(Vec::new()).unwrap();
        logger.emit(&event(15.0, false)).unwrap();
        logger.emit(&event(7.125, true)).unwrap();
        logger.finish().unwrap();

        let bytes = logger.writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.trim().lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,magnitude");
        assert!(lines[1].ends_with(",15.00"), "{}", lines[1]);
        assert!(lines[2].ends_with(",7.13"), "{}", lines[2]);
        // タイムスタンプは "YYYY-MM-DD HH:MM:SS"
        let stamp = lines[1].split(',').next().unwrap();
        assert_eq!(stamp.len(), 19);
    }

    #[test]
    fn test_csv_truncates_on_create() {
        let dir = std::env::temp_dir();
        let path = dir.join("taiso_meter_csv_test.csv");
        {
            let mut logger = CsvLogger::create(&path).unwrap();
            logger.emit(&event(10.0, false)).unwrap();
            logger.finish().unwrap();
        }
        {
            // 再作成でヘッダのみに戻る
            let mut logger = CsvLogger::create(&path).unwrap();
            logger.finish().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), "timestamp,magnitude");
        let _ = std::fs::remove_file(&path);
    }
}
