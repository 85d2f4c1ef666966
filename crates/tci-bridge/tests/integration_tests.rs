//! Integration tests for the IQ bridge
//!
//! These run the full production wiring: real TCP listeners on ephemeral
//! ports for both endpoints, and the real upstream client connected through
//! `tokio::io::duplex()` to the simulated radio from `tci-sim`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tci_bridge::context::{BridgeConfig, SessionContext};
use tci_bridge::control::run_control_server;
use tci_bridge::session::SessionController;
use tci_bridge::shutdown::{coordinate, BridgeTasks};
use tci_bridge::streaming::run_streaming_server;
use tci_bridge::upstream::{run_upstream_client, UpstreamHandle};
use tci_protocol::TciCommand;
use tci_sim::{run_sim_radio, sim_radio_channel, SimRadioHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct TestBridge {
    ctx: Arc<SessionContext>,
    sim: SimRadioHandle,
    control_addr: SocketAddr,
    iq_addr: SocketAddr,
    tasks: BridgeTasks,
}

async fn start_bridge(config: BridgeConfig) -> TestBridge {
    let (bridge_io, sim_stream) = tokio::io::duplex(1 << 16);
    let (sim, sim_io) = sim_radio_channel();
    tokio::spawn(run_sim_radio(sim_stream, sim_io));

    let ctx = Arc::new(SessionContext::new(config));
    let (handle, req_rx) = UpstreamHandle::channel(64);
    let (event_tx, event_rx) = mpsc::channel(256);

    let control_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let iq_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let control_addr = control_listener.local_addr().unwrap();
    let iq_addr = iq_listener.local_addr().unwrap();

    let tasks = BridgeTasks {
        upstream: tokio::spawn(run_upstream_client(
            bridge_io,
            ctx.clone(),
            req_rx,
            event_tx,
        )),
        session: tokio::spawn(SessionController::new(ctx.clone(), handle.clone(), event_rx).run()),
        control: tokio::spawn(run_control_server(control_listener, ctx.clone(), handle)),
        streaming: tokio::spawn(run_streaming_server(iq_listener, ctx.clone())),
    };

    TestBridge {
        ctx,
        sim,
        control_addr,
        iq_addr,
        tasks,
    }
}

/// Poll the sim's received-command log until `pred` holds
async fn wait_for_commands(sim: &SimRadioHandle, pred: impl Fn(&[TciCommand]) -> bool) {
    timeout(Duration::from_secs(3), async {
        loop {
            if pred(&sim.sent()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("expected upstream commands not observed in time");
}

/// Assert `expected` appears within `actual` in order (gaps allowed)
fn assert_subsequence(actual: &[TciCommand], expected: &[TciCommand]) {
    let mut it = actual.iter();
    for want in expected {
        assert!(
            it.any(|got| got == want),
            "command {:?} missing or out of order in {:?}",
            want,
            actual
        );
    }
}

fn count_of(sent: &[TciCommand], want: &TciCommand) -> usize {
    sent.iter().filter(|c| *c == want).count()
}

#[tokio::test]
async fn control_messages_propagate_once_each() {
    let bridge = start_bridge(BridgeConfig::default()).await;

    // Controller's startup rate push arrives first
    wait_for_commands(&bridge.sim, |sent| !sent.is_empty()).await;

    let mut control = TcpStream::connect(bridge.control_addr).await.unwrap();
    control.write_all(b"samp_rate:48000\n").await.unwrap();
    control.write_all(b"center_freq:7100000\n").await.unwrap();
    control.write_all(b"samp_rate:48000\n").await.unwrap();

    wait_for_commands(&bridge.sim, |sent| {
        count_of(sent, &TciCommand::IqSampleRate { rate: 48_000 }) == 2
            && count_of(
                sent,
                &TciCommand::Dds {
                    rx: 0,
                    freq: 7_100_000,
                },
            ) == 1
    })
    .await;

    // One propagation per accepted message, in arrival order, duplicates
    // not deduplicated
    assert_eq!(
        bridge.sim.sent(),
        vec![
            TciCommand::IqSampleRate { rate: 96_000 },
            TciCommand::IqSampleRate { rate: 48_000 },
            TciCommand::Dds {
                rx: 0,
                freq: 7_100_000,
            },
            TciCommand::IqSampleRate { rate: 48_000 },
        ]
    );
    assert_eq!(bridge.ctx.tuning.samp_rate(), 48_000);
    assert_eq!(bridge.ctx.tuning.center_freq(), 7_100_000);
}

#[tokio::test]
async fn malformed_control_lines_are_ignored_and_connection_survives() {
    let bridge = start_bridge(BridgeConfig::default()).await;
    wait_for_commands(&bridge.sim, |sent| !sent.is_empty()).await;

    let mut control = TcpStream::connect(bridge.control_addr).await.unwrap();
    control.write_all(b"nonsense\n").await.unwrap();
    control.write_all(b"gain:10\n").await.unwrap();
    control.write_all(b"center_freq:seven\n").await.unwrap();
    control.write_all(b"center_freq:3500000\n").await.unwrap();

    wait_for_commands(&bridge.sim, |sent| {
        count_of(
            sent,
            &TciCommand::Dds {
                rx: 0,
                freq: 3_500_000,
            },
        ) == 1
    })
    .await;
    assert_eq!(bridge.ctx.tuning.center_freq(), 3_500_000);
}

#[tokio::test]
async fn concurrent_control_connections_are_served() {
    let bridge = start_bridge(BridgeConfig::default()).await;
    wait_for_commands(&bridge.sim, |sent| !sent.is_empty()).await;

    let mut a = TcpStream::connect(bridge.control_addr).await.unwrap();
    let mut b = TcpStream::connect(bridge.control_addr).await.unwrap();
    a.write_all(b"center_freq:7000000\n").await.unwrap();
    b.write_all(b"samp_rate:192000\n").await.unwrap();

    wait_for_commands(&bridge.sim, |sent| {
        count_of(
            sent,
            &TciCommand::Dds {
                rx: 0,
                freq: 7_000_000,
            },
        ) == 1
            && count_of(sent, &TciCommand::IqSampleRate { rate: 192_000 }) == 1
    })
    .await;
}

#[tokio::test]
async fn end_to_end_session_lifecycle() {
    let bridge = start_bridge(BridgeConfig::default()).await;
    wait_for_commands(&bridge.sim, |sent| !sent.is_empty()).await;

    // Tune first
    let mut control = TcpStream::connect(bridge.control_addr).await.unwrap();
    control.write_all(b"samp_rate:48000\n").await.unwrap();
    control.write_all(b"center_freq:7100000\n").await.unwrap();
    wait_for_commands(&bridge.sim, |sent| {
        count_of(
            sent,
            &TciCommand::Dds {
                rx: 0,
                freq: 7_100_000,
            },
        ) >= 1
    })
    .await;

    // Attaching a consumer triggers the ordered start sequence
    let mut consumer = TcpStream::connect(bridge.iq_addr).await.unwrap();
    wait_for_commands(&bridge.sim, |sent| {
        sent.iter().any(|c| matches!(c, TciCommand::IqStart { .. }))
    })
    .await;
    assert_subsequence(
        &bridge.sim.sent(),
        &[
            TciCommand::IqSampleRate { rate: 48_000 },
            TciCommand::RxEnable { rx: 0, enable: true },
            TciCommand::IqSampleRate { rate: 48_000 },
            TciCommand::Dds {
                rx: 0,
                freq: 7_100_000,
            },
            TciCommand::IqStart { rx: 0 },
        ],
    );

    // Injected blocks are relayed byte for byte, in order
    bridge.sim.inject_iq(vec![1, 2, 3, 4]).await;
    bridge.sim.inject_iq(vec![5, 6]).await;
    let mut received = [0u8; 6];
    timeout(Duration::from_secs(3), consumer.read_exact(&mut received))
        .await
        .expect("relayed bytes not received")
        .unwrap();
    assert_eq!(received, [1, 2, 3, 4, 5, 6]);

    // Disconnect; the relay notices on its next write, then the controller
    // stops the stream within one poll interval
    drop(consumer);
    timeout(Duration::from_secs(3), async {
        loop {
            if bridge
                .sim
                .sent()
                .iter()
                .any(|c| matches!(c, TciCommand::IqStop { .. }))
            {
                return;
            }
            bridge.sim.inject_iq(vec![0u8; 32]).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stream stop not observed after consumer disconnect");
}

#[tokio::test]
async fn echo_mismatch_keeps_session_alive() {
    let bridge = start_bridge(BridgeConfig::default()).await;
    wait_for_commands(&bridge.sim, |sent| !sent.is_empty()).await;

    // Tune while the device echo races the second update; the session must
    // survive regardless
    let mut control = TcpStream::connect(bridge.control_addr).await.unwrap();
    for _ in 0..5 {
        control.write_all(b"center_freq:7000000\n").await.unwrap();
        control.write_all(b"center_freq:7100000\n").await.unwrap();
    }
    wait_for_commands(&bridge.sim, |sent| {
        count_of(
            sent,
            &TciCommand::Dds {
                rx: 0,
                freq: 7_100_000,
            },
        ) == 5
    })
    .await;

    // Bridge still healthy: a consumer can start a session
    let _consumer = TcpStream::connect(bridge.iq_addr).await.unwrap();
    wait_for_commands(&bridge.sim, |sent| {
        sent.iter().any(|c| matches!(c, TciCommand::IqStart { .. }))
    })
    .await;
}

#[tokio::test]
async fn signal_shutdown_completes_stop_sequence() {
    let bridge = start_bridge(BridgeConfig::default()).await;
    wait_for_commands(&bridge.sim, |sent| !sent.is_empty()).await;

    let _consumer = TcpStream::connect(bridge.iq_addr).await.unwrap();
    wait_for_commands(&bridge.sim, |sent| {
        sent.iter().any(|c| matches!(c, TciCommand::IqStart { .. }))
    })
    .await;

    let TestBridge {
        ctx,
        sim,
        control_addr,
        iq_addr,
        tasks,
    } = bridge;

    let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
    let coordinator = tokio::spawn(coordinate(ctx, tasks, async {
        let _ = signal_rx.await;
    }));

    signal_tx.send(()).unwrap();
    timeout(Duration::from_secs(5), coordinator)
        .await
        .expect("shutdown did not complete")
        .unwrap()
        .expect("shutdown was not clean");

    // The in-flight session was stopped cleanly before exit
    assert!(sim
        .sent()
        .iter()
        .any(|c| matches!(c, TciCommand::IqStop { .. })));

    // No new connections are accepted after shutdown
    assert!(TcpStream::connect(control_addr).await.is_err());
    assert!(TcpStream::connect(iq_addr).await.is_err());
}
