//! Integration tests for `RemoteSession` against the recording mock transport.

use std::sync::Arc;
use std::time::Duration;

use rcmd_core::ConnectionConfig;
use rcmd_core::error::Error;
use rcmd_test_utils::{MockResponse, TransportEvent, mock_session, mock_session_with};

#[tokio::test]
async fn connect_twice_performs_one_handshake() {
    let (session, connector) = mock_session();

    session.connect().await.unwrap();
    session.connect().await.unwrap();

    assert_eq!(connector.connect_count(), 1);
    assert!(session.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connects_open_one_transport() {
    let (session, connector) = mock_session();
    connector.set_connect_delay(Duration::from_millis(20));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.connect().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test]
async fn execute_on_disconnected_session_connects_once() {
    let (session, connector) = mock_session();

    let output = session.execute("mpc status").await.unwrap();

    assert_eq!(output.stdout, "mpc status");
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(
        connector.events()[0..2],
        [
            TransportEvent::Connect { attempt: 1 },
            TransportEvent::Begin {
                command: "mpc status".into()
            },
        ]
    );
}

#[tokio::test]
async fn implicit_connect_failure_is_a_connection_error() {
    let (session, connector) = mock_session();
    connector.fail_next_connects(1);

    let err = session.execute("mpc play").await.unwrap_err();

    assert!(err.is_connection());
    assert!(!session.is_connected());
    assert_eq!(connector.exec_count(), 0);
}

#[tokio::test]
async fn drop_mid_command_is_an_execution_error() {
    let (session, connector) = mock_session();
    connector.respond("mpc next", MockResponse::Drop);

    let err = session.execute("mpc next").await.unwrap_err();

    assert!(matches!(err, Error::ConnectionClosed));
    assert!(err.is_execution());
    assert!(!session.is_connected());

    session.execute("mpc prev").await.unwrap();
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test]
async fn idle_drop_reconnects_on_next_command() {
    let (session, connector) = mock_session();
    session.connect().await.unwrap();

    connector.drop_connection();
    let output = session.execute("mpc toggle").await.unwrap();

    assert_eq!(output.stdout, "mpc toggle");
    assert_eq!(connector.connect_count(), 2);
    assert_eq!(connector.close_count(), 1);
}

#[tokio::test]
async fn timeout_releases_the_guard() {
    let (session, connector) = mock_session();
    connector.respond("mpc idle", MockResponse::Hang);

    let err = session
        .execute_with_timeout("mpc idle", Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandTimeout { .. }));

    let output = session.execute("mpc current").await.unwrap();
    assert_eq!(output.stdout, "mpc current");
    assert_eq!(connector.connect_count(), 1);

    let round_trips: Vec<_> = connector
        .events()
        .into_iter()
        .filter(|e| !matches!(e, TransportEvent::Connect { .. }))
        .collect();
    assert_eq!(
        round_trips,
        vec![
            TransportEvent::Begin {
                command: "mpc idle".into()
            },
            TransportEvent::Abandon {
                command: "mpc idle".into()
            },
            TransportEvent::Begin {
                command: "mpc current".into()
            },
            TransportEvent::End {
                command: "mpc current".into()
            },
        ]
    );
}

#[tokio::test]
async fn slow_connect_is_bounded_by_connect_timeout() {
    let (session, connector) = mock_session_with(
        ConnectionConfig::new("mockhost").with_connect_timeout(Duration::from_millis(30)),
    );
    connector.set_connect_delay(Duration::from_secs(5));

    let err = session.connect().await.unwrap_err();

    assert!(matches!(err, Error::ConnectTimeout(_)));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn close_never_connected_and_twice() {
    let (session, connector) = mock_session();

    session.close().await;
    session.close().await;
    assert_eq!(connector.total_calls(), 0);

    session.connect().await.unwrap();
    session.close().await;
    session.close().await;
    assert_eq!(connector.close_count(), 1);
    assert!(!session.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_round_trips_never_interleave() {
    let (session, connector) = mock_session();
    connector.set_default_delay(Duration::from_millis(2));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.execute(&format!("mpc volume {}", i)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(connector.max_concurrent_execs(), 1);

    let round_trips: Vec<_> = connector
        .events()
        .into_iter()
        .filter(|e| !matches!(e, TransportEvent::Connect { .. }))
        .collect();
    assert_eq!(round_trips.len(), 32);
    for pair in round_trips.chunks(2) {
        match pair {
            [
                TransportEvent::Begin { command: begin },
                TransportEvent::End { command: end },
            ] => assert_eq!(begin, end),
            other => panic!("interleaved round trip: {:?}", other),
        }
    }
}
