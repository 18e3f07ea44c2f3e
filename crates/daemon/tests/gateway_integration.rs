//! End-to-end integration tests for ObexGate.
//!
//! These tests drive a dispatcher over an in-memory channel with the loopback
//! Bluetooth backend rooted in a temporary directory:
//! - File-transfer sessions (upload, listing, abort, inactivity timeout)
//! - Pairing with a PIN
//! - Persistence of the device store

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use daemon::bluetooth::LoopbackAdapter;
use daemon::config::{BluetoothConfig, PeerConfig};
use daemon::connection::{Connection, FrameReader};
use daemon::devices::{DeviceStore, PinStore};
use daemon::indicator::{Indicator, LedState, LogIndicator};
use daemon::{ConnectionEnd, Dispatcher, DispatcherConfig, SessionSettings};
use protocol::DeviceAddress;
use tempfile::TempDir;
use tokio::io::{duplex, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

const WAIT: Duration = Duration::from_secs(5);
const PHONE: &str = "A0B1C2D3E4F5";
const HEADSET: &str = "001122334455";

/// The controller end of the command channel.
struct Controller {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Controller {
    async fn send(&mut self, command: &str) {
        self.writer
            .write_all(format!("{}\r", command).as_bytes())
            .await
            .unwrap();
    }

    async fn send_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
    }

    async fn expect(&mut self, want: &str) {
        let line = tokio::time::timeout(WAIT, self.reader.next_line())
            .await
            .expect("response in time")
            .unwrap()
            .expect("channel open");
        assert_eq!(line.original(), want);
    }

    async fn expect_all(&mut self, want: &[&str]) {
        for line in want {
            self.expect(line).await;
        }
    }
}

struct Gateway {
    temp_dir: TempDir,
    indicator: Arc<LogIndicator>,
    dispatcher: Dispatcher<LoopbackAdapter>,
}

fn bluetooth_config(temp_dir: &TempDir, list_delay_ms: u64) -> BluetoothConfig {
    BluetoothConfig {
        root: temp_dir.path().join("peers"),
        pin_file: temp_dir.path().join("BT_pincode"),
        list_delay_ms,
        peers: vec![
            PeerConfig {
                address: PHONE.parse().unwrap(),
                name: "Phone".to_string(),
                class: 0x5a020c,
                channel: 10,
                pin: None,
                invalid: false,
            },
            PeerConfig {
                address: HEADSET.parse().unwrap(),
                name: String::new(),
                class: 0x240404,
                channel: 3,
                pin: Some("1234".to_string()),
                invalid: false,
            },
        ],
        ..BluetoothConfig::default()
    }
}

fn open_gateway(temp_dir: TempDir, settings: SessionSettings, list_delay_ms: u64) -> Gateway {
    let bluetooth = bluetooth_config(&temp_dir, list_delay_ms);
    let devices = Arc::new(DeviceStore::new(temp_dir.path().join("devices.json")));
    devices.load().unwrap();

    let indicator = Arc::new(LogIndicator::default());
    let dispatcher = Dispatcher::new(
        LoopbackAdapter::new(&bluetooth),
        devices,
        PinStore::new(&bluetooth.pin_file),
        indicator.clone(),
        DispatcherConfig {
            session: settings,
            ..DispatcherConfig::default()
        },
    );

    Gateway {
        temp_dir,
        indicator,
        dispatcher,
    }
}

fn create_gateway() -> Gateway {
    open_gateway(TempDir::new().unwrap(), SessionSettings::default(), 0)
}

impl Gateway {
    fn peer_root(&self, address: &str) -> PathBuf {
        let address: DeviceAddress = address.parse().unwrap();
        self.dispatcher.adapter().peer_root(&address)
    }

    /// Serve one connection on this task while `script` plays the controller.
    async fn drive<F, Fut>(&self, script: F) -> ConnectionEnd
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (client, server) = duplex(16 * 1024);
        let (read, write) = tokio::io::split(server);
        let (client_read, client_write) = tokio::io::split(client);
        let controller = tokio::spawn(script(Controller {
            reader: FrameReader::new(client_read),
            writer: client_write,
        }));

        let end = self
            .dispatcher
            .serve(Connection::new(read, write))
            .await
            .unwrap();
        controller.await.unwrap();
        end
    }
}

// =============================================================================
// File-Transfer Sessions
// =============================================================================

#[tokio::test]
async fn test_upload_then_list() {
    let gateway = create_gateway();

    let end = gateway
        .drive(|mut ctl| async move {
            ctl.send("ATDA0B1C2D3E4F5,1106").await;
            ctl.expect_all(&["BTUP A0B1C2D3E4F5,1106", "200 FTP"]).await;

            ctl.send("MD \"Docs\"").await;
            ctl.expect("200 FTP").await;

            ctl.send("PUT \"hello.txt\"").await;
            ctl.expect("!").await;
            ctl.send("5").await;
            ctl.expect("?").await;
            ctl.send_raw(b"hello").await;
            ctl.expect("!").await;
            ctl.send("0").await;
            ctl.expect("200 FTP").await;

            ctl.send("DIR -RAW").await;
            ctl.expect_all(&[
                "<?xml version=\"1.0\"?>",
                "<!DOCTYPE folder-listing SYSTEM \"obex-folder-listing.dtd\">",
                "<folder-listing version=\"1.0\">",
                "  <parent-folder/>",
                "  <file name=\"hello.txt\" size=\"5\"/>",
                "</folder-listing>",
                "200 FTP",
            ])
            .await;

            ctl.send("QUIT").await;
            ctl.expect_all(&["200 FTP", "BTDOWN"]).await;
            ctl.send("ATH").await;
            ctl.expect("BTDOWN").await;
        })
        .await;

    assert_eq!(end, ConnectionEnd::HungUp);
    let stored = gateway.peer_root(PHONE).join("Docs").join("hello.txt");
    assert_eq!(std::fs::read(stored).unwrap(), b"hello");
}

#[tokio::test]
async fn test_upload_survives_byte_level_splits() {
    let gateway = create_gateway();

    let end = gateway
        .drive(|mut ctl| async move {
            ctl.send("ATDA0B1C2D3E4F5,1106").await;
            ctl.expect_all(&["BTUP A0B1C2D3E4F5,1106", "200 FTP"]).await;

            ctl.send_raw(b"PUT \"f.txt\"\r").await;
            ctl.expect("!").await;
            ctl.send_raw(b"5\r").await;
            ctl.expect("?").await;
            ctl.send_raw(b"\nhello").await;
            ctl.expect("!").await;
            ctl.send_raw(b"0\r").await;
            ctl.expect("200 FTP").await;

            // A quoted name with an embedded terminator, split mid-argument.
            ctl.send_raw(b"MD \"two\r").await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            ctl.send_raw(b"\nparts\"\r").await;
            ctl.expect("200 FTP").await;

            ctl.send("QUIT").await;
            ctl.expect_all(&["200 FTP", "BTDOWN"]).await;
            ctl.send("ATH").await;
            ctl.expect("BTDOWN").await;
        })
        .await;

    assert_eq!(end, ConnectionEnd::HungUp);
    let root = gateway.peer_root(PHONE);
    assert_eq!(std::fs::read(root.join("f.txt")).unwrap(), b"hello");
    assert!(root.join("two\r\nparts").is_dir());
}

#[tokio::test]
async fn test_abort_slow_listing() {
    let gateway = open_gateway(TempDir::new().unwrap(), SessionSettings::default(), 3_000);

    let end = gateway
        .drive(|mut ctl| async move {
            ctl.send("ATDA0B1C2D3E4F5").await;
            ctl.expect_all(&["BTUP A0B1C2D3E4F5", "200 FTP"]).await;

            ctl.send("MD \"Camera\"").await;
            ctl.expect("200 FTP").await;

            let started = tokio::time::Instant::now();
            ctl.send("DIR -RAW").await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            ctl.send("ABORT").await;
            ctl.expect("200 FTP").await;
            assert!(started.elapsed() < Duration::from_secs(2));

            // The aborted listing leaves the session at the root folder.
            ctl.send("MD \"Inbox\"").await;
            ctl.expect("200 FTP").await;
            ctl.send("MAX").await;
            ctl.expect_all(&["4096", "200 FTP"]).await;
            ctl.send("QUIT").await;
            ctl.expect_all(&["200 FTP", "BTDOWN"]).await;
        })
        .await;

    assert_eq!(end, ConnectionEnd::PeerClosed);
    let root = gateway.peer_root(PHONE);
    assert!(root.join("Inbox").is_dir());
    assert!(!root.join("Camera").join("Inbox").exists());
}

#[tokio::test]
async fn test_inactive_session_times_out() {
    let settings = SessionSettings {
        inactive_timeout: Duration::from_millis(100),
        ..SessionSettings::default()
    };
    let gateway = open_gateway(TempDir::new().unwrap(), settings, 0);

    let end = gateway
        .drive(|mut ctl| async move {
            ctl.send("ATDA0B1C2D3E4F5,1106").await;
            ctl.expect_all(&["BTUP A0B1C2D3E4F5,1106", "200 FTP"]).await;

            tokio::time::sleep(Duration::from_millis(400)).await;
            ctl.send("CD \\").await;
            ctl.expect("BTDOWN").await;

            ctl.send("ATE0").await;
            ctl.expect("OK").await;
            ctl.send("ATH").await;
            ctl.expect("BTDOWN").await;
        })
        .await;

    assert_eq!(end, ConnectionEnd::HungUp);
    assert_eq!(gateway.indicator.current(), LedState::FlashDiscoverable);
    assert!(gateway.indicator.history().contains(&LedState::Solid));
}

#[tokio::test]
async fn test_failed_upload_keeps_session() {
    let gateway = create_gateway();

    gateway
        .drive(|mut ctl| async move {
            ctl.send("ATDA0B1C2D3E4F5,1106").await;
            ctl.expect_all(&["BTUP A0B1C2D3E4F5,1106", "200 FTP"]).await;

            ctl.send("PUT \"big.bin\"").await;
            ctl.expect("!").await;
            ctl.send("5000").await;
            ctl.expect("500 FTP").await;

            ctl.send("DIR -RAW").await;
            ctl.expect_all(&[
                "<?xml version=\"1.0\"?>",
                "<!DOCTYPE folder-listing SYSTEM \"obex-folder-listing.dtd\">",
                "<folder-listing version=\"1.0\">",
                "</folder-listing>",
                "200 FTP",
            ])
            .await;
            ctl.send("QUIT").await;
            ctl.expect_all(&["200 FTP", "BTDOWN"]).await;
        })
        .await;

    let root = gateway.peer_root(PHONE);
    assert_eq!(std::fs::read_dir(root).unwrap().count(), 0);
}

#[tokio::test]
async fn test_channel_closed_mid_session() {
    let gateway = create_gateway();

    let end = gateway
        .drive(|mut ctl| async move {
            ctl.send("ATDA0B1C2D3E4F5,1106").await;
            ctl.expect_all(&["BTUP A0B1C2D3E4F5,1106", "200 FTP"]).await;
            drop(ctl);
        })
        .await;

    assert_eq!(end, ConnectionEnd::PeerClosed);
    assert_eq!(gateway.indicator.current(), LedState::FlashDiscoverable);
}

// =============================================================================
// Pairing and Device Store
// =============================================================================

#[tokio::test]
async fn test_pair_with_pin() {
    let gateway = create_gateway();
    let pin_file = gateway.temp_dir.path().join("BT_pincode");

    gateway
        .drive(|mut ctl| async move {
            ctl.send("AT+BTK=\"1234\"").await;
            ctl.expect("OK").await;
            ctl.send("AT+BTW001122334455").await;
            ctl.expect_all(&["OK", "PAIR 0 001122334455 00"]).await;

            ctl.send("AT+BTT?").await;
            ctl.expect_all(&["001122334455,\"001122334455\"", "OK"]).await;

            ctl.send("AT+BTW001122334455").await;
            ctl.expect_all(&["OK", "PAIR 1 001122334455"]).await;
            ctl.send("ATH").await;
            ctl.expect("BTDOWN").await;
        })
        .await;

    assert!(!pin_file.exists());

    let reloaded = DeviceStore::new(gateway.temp_dir.path().join("devices.json"));
    reloaded.load().unwrap();
    let devices = reloaded.list().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].address.compact(), HEADSET);
    assert!(devices[0].trusted);
}

#[tokio::test]
async fn test_friendly_name_survives_restart() {
    let gateway = create_gateway();

    gateway
        .drive(|mut ctl| async move {
            ctl.send("AT+BTF=\"Workshop Gateway\"").await;
            ctl.expect("OK").await;
            ctl.send("ATH").await;
            ctl.expect("BTDOWN").await;
        })
        .await;

    let restarted = open_gateway(gateway.temp_dir, SessionSettings::default(), 0);
    assert_eq!(restarted.dispatcher.adapter().local_name(), "");
    restarted.dispatcher.restore_local_name().await;
    assert_eq!(
        restarted.dispatcher.adapter().local_name(),
        "Workshop Gateway"
    );
}

#[tokio::test]
async fn test_inquiry_names_used_for_listing() {
    let gateway = create_gateway();

    gateway
        .drive(|mut ctl| async move {
            ctl.send("AT+BTIN").await;
            ctl.expect_all(&[
                "A0B1C2D3E4F5,5A020C,\"Phone\"",
                "\"*001122334455\"",
                "OK",
            ])
            .await;
            ctl.send("AT+BTWA0B1C2D3E4F5,1106").await;
            ctl.expect_all(&["OK", "PAIR 0 A0B1C2D3E4F5,1106 00"]).await;
            ctl.send("AT+BTT?").await;
            ctl.expect_all(&["A0B1C2D3E4F5,\"Phone\"", "OK"]).await;
            ctl.send("AT+BTD*").await;
            ctl.expect("OK").await;
            ctl.send("AT+BTT?").await;
            ctl.expect("OK").await;
            ctl.send("ATH").await;
            ctl.expect("BTDOWN").await;
        })
        .await;

    assert!(gateway.dispatcher.devices().is_empty().unwrap());
}
