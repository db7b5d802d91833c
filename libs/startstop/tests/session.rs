
use std::time::{Duration, Instant};

use harness::{free_port, roundtrip, MockProcess, SessionHandle, EVENT_TIMEOUT};
use mcl_startstop::{NetAddr, Session, SessionConfig, SessionError, SessionEvent};
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

#[tokio::test]
async fn first_connection_starts_process_and_idle_stops_it() {
    let process = MockProcess::new(free_port().await.unwrap());
    let idle = Duration::from_millis(100);
    let mut session = SessionHandle::spawn(SessionHandle::builder(&process, idle)).await;

    let mut client = TcpStream::connect(session.addr).await.unwrap();
    let echoed = roundtrip(&mut client, b"ping").await.unwrap();
    assert_eq!(echoed, b"ping");
    assert_eq!(process.start_count(), 1);

    drop(client);
    let closed_at = Instant::now();

    session
        .wait_for(|e| matches!(e, SessionEvent::ProcessExited { requested: true }))
        .await;

    let stopped_after = process.stopped_at().unwrap() - closed_at;
    assert!(
        stopped_after >= idle,
        "stop came {stopped_after:?} after close, before the idle duration"
    );
    assert!(
        stopped_after < Duration::from_millis(250),
        "stop came {stopped_after:?} after close"
    );
    assert_eq!(process.stop_count(), 1);

    assert!(session.shutdown().await.is_cancelled());
}

#[tokio::test]
async fn concurrent_connections_share_one_start() {
    let process = MockProcess::new(free_port().await.unwrap());
    let session =
        SessionHandle::spawn(SessionHandle::builder(&process, Duration::from_secs(60))).await;

    let mut a = TcpStream::connect(session.addr).await.unwrap();
    let mut b = TcpStream::connect(session.addr).await.unwrap();

    let (ra, rb) = tokio::join!(roundtrip(&mut a, b"alpha"), roundtrip(&mut b, b"bravo"));
    assert_eq!(ra.unwrap(), b"alpha");
    assert_eq!(rb.unwrap(), b"bravo");

    assert_eq!(process.start_count(), 1);
    assert_eq!(process.stop_count(), 0);

    session.shutdown().await;
}

#[tokio::test]
async fn new_connection_during_countdown_keeps_process_running() {
    let process = MockProcess::new(free_port().await.unwrap());
    let mut session =
        SessionHandle::spawn(SessionHandle::builder(&process, Duration::from_millis(300))).await;

    let mut first = TcpStream::connect(session.addr).await.unwrap();
    roundtrip(&mut first, b"one").await.unwrap();
    drop(first);
    session
        .wait_for(|e| matches!(e, SessionEvent::TimerArmed))
        .await;

    let mut second = TcpStream::connect(session.addr).await.unwrap();
    session
        .wait_for(|e| matches!(e, SessionEvent::TimerDisarmed))
        .await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(roundtrip(&mut second, b"two").await.unwrap(), b"two");
    assert_eq!(process.start_count(), 1);
    assert_eq!(process.stop_count(), 0);

    session.shutdown().await;
}

#[tokio::test]
async fn process_restarts_after_idle_stop() {
    let process = MockProcess::new(free_port().await.unwrap());
    let mut session =
        SessionHandle::spawn(SessionHandle::builder(&process, Duration::from_millis(50))).await;

    for round in 1..=2 {
        let mut client = TcpStream::connect(session.addr).await.unwrap();
        assert_eq!(roundtrip(&mut client, b"hello").await.unwrap(), b"hello");
        drop(client);

        session
            .wait_for(|e| matches!(e, SessionEvent::ProcessExited { requested: true }))
            .await;
        assert_eq!(process.start_count(), round);
        assert_eq!(process.stop_count(), round);
    }

    session.shutdown().await;
}

#[tokio::test]
async fn unsolicited_exit_is_restarted_by_next_connection() {
    let process = MockProcess::new(free_port().await.unwrap());
    let mut session =
        SessionHandle::spawn(SessionHandle::builder(&process, Duration::from_secs(60))).await;

    let mut client = TcpStream::connect(session.addr).await.unwrap();
    roundtrip(&mut client, b"first").await.unwrap();
    drop(client);
    session
        .wait_for(|e| matches!(e, SessionEvent::TimerArmed))
        .await;

    process.exit_now();
    session
        .wait_for(|e| matches!(e, SessionEvent::ProcessExited { requested: false }))
        .await;

    let mut client = TcpStream::connect(session.addr).await.unwrap();
    assert_eq!(roundtrip(&mut client, b"again").await.unwrap(), b"again");
    assert_eq!(process.start_count(), 2);
    assert_eq!(process.stop_count(), 0);

    session.shutdown().await;
}

#[tokio::test]
async fn start_error_ends_session_without_stop() {
    let process = MockProcess::failing(free_port().await.unwrap(), "server jar missing");
    let session =
        SessionHandle::spawn(SessionHandle::builder(&process, Duration::from_secs(60))).await;

    let _client = TcpStream::connect(session.addr).await.unwrap();

    match session.join().await {
        SessionError::Process(e) => assert_eq!(e.to_string(), "server jar missing"),
        other => panic!("expected process error, got {other:?}"),
    }
    assert_eq!(process.start_count(), 1);
    assert_eq!(process.stop_count(), 0);
}

#[tokio::test]
async fn stop_failure_ends_session() {
    let process = MockProcess::refusing_stop(free_port().await.unwrap(), "stop refused");
    let session =
        SessionHandle::spawn(SessionHandle::builder(&process, Duration::from_millis(50))).await;

    let mut client = TcpStream::connect(session.addr).await.unwrap();
    assert_eq!(roundtrip(&mut client, b"ping").await.unwrap(), b"ping");
    drop(client);

    let err = session.join().await;
    assert_eq!(err.reason_code(), "stop_failed");
    match err {
        SessionError::Stop(e) => assert_eq!(e.to_string(), "stop refused"),
        other => panic!("expected stop error, got {other:?}"),
    }
    assert_eq!(process.start_count(), 1);
    assert_eq!(process.stop_count(), 1);
}

#[tokio::test]
async fn cancel_mid_copy_closes_both_ends_promptly() {
    let process = MockProcess::new(free_port().await.unwrap());
    let session =
        SessionHandle::spawn(SessionHandle::builder(&process, Duration::from_secs(60))).await;

    let client = TcpStream::connect(session.addr).await.unwrap();
    let (mut reader, mut writer) = client.into_split();
    let writer_task = tokio::spawn(async move {
        let chunk = vec![0x5a_u8; 16 * 1024];
        while writer.write_all(&chunk).await.is_ok() {}
    });

    // Echoed bytes mean both directions are copying.
    let mut buf = vec![0u8; 16 * 1024];
    let n = timeout(EVENT_TIMEOUT, reader.read(&mut buf))
        .await
        .expect("no echo while streaming")
        .unwrap();
    assert!(n > 0);

    let started = Instant::now();
    let err = session.shutdown().await;
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(1));

    timeout(Duration::from_secs(2), async {
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await
    .expect("client should observe the close");

    timeout(Duration::from_secs(2), async {
        while process.backend_closed_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("backend connection should observe the close");

    writer_task.abort();
}

#[tokio::test]
async fn cancel_before_any_connection_never_starts_process() {
    let process = MockProcess::new(free_port().await.unwrap());
    let session =
        SessionHandle::spawn(SessionHandle::builder(&process, Duration::from_secs(60))).await;

    assert!(session.shutdown().await.is_cancelled());
    assert_eq!(process.start_count(), 0);
    assert_eq!(process.stop_count(), 0);
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let process = MockProcess::new(free_port().await.unwrap());

    let config = SessionHandle::builder(&process, Duration::from_secs(60))
        .source(taken.local_addr().unwrap().into())
        .build()
        .unwrap();

    let Err(err) = Session::new(config)
        .run(mcl_startstop::CancellationToken::new())
        .await;
    assert!(matches!(err, SessionError::Bind { .. }), "got {err:?}");
    assert_eq!(err.reason_code(), "bind_failed");
    assert_eq!(process.start_count(), 0);
}

#[test]
fn missing_process_is_a_config_error() {
    let err = SessionConfig::builder()
        .source(NetAddr::tcp("127.0.0.1", 0))
        .target(NetAddr::tcp("127.0.0.1", 25566))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("managed process"));
}

#[tokio::test]
async fn large_payload_roundtrips_intact() {
    let process = MockProcess::new(free_port().await.unwrap());
    let session =
        SessionHandle::spawn(SessionHandle::builder(&process, Duration::from_secs(60))).await;

    let mut payload = vec![0u8; 4 * 1024 * 1024];
    rand::rng().fill_bytes(&mut payload);

    let client = TcpStream::connect(session.addr).await.unwrap();
    let (mut reader, mut writer) = client.into_split();

    let sent = payload.clone();
    let write_task = tokio::spawn(async move {
        writer.write_all(&[]).await.unwrap();
        for chunk in sent.chunks(64 * 1024) {
            writer.write_all(chunk).await.unwrap();
        }
        writer.shutdown().await.unwrap();
    });

    let mut received = Vec::with_capacity(payload.len());
    timeout(Duration::from_secs(10), reader.read_to_end(&mut received))
        .await
        .expect("echo did not finish")
        .unwrap();
    write_task.await.unwrap();

    assert_eq!(received.len(), payload.len());
    assert!(received == payload, "echoed bytes differ from payload");

    session.shutdown().await;
}
