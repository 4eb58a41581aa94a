//! rcmd-test-utils: Test infrastructure for rcmd.
//!
//! Provides:
//! - MockConnector / MockTransport: scripted in-memory transport that records
//!   connects, round trips and closes for ordering assertions

mod mock_transport;

pub use mock_transport::{MockConnector, MockResponse, MockTransport, TransportEvent};

use std::sync::Arc;

use rcmd_core::config::ConnectionConfig;
use rcmd_core::session::RemoteSession;

/// Session over a fresh mock connector; the returned connector shares its state.
pub fn mock_session() -> (Arc<RemoteSession<MockConnector>>, MockConnector) {
    mock_session_with(ConnectionConfig::new("mockhost"))
}

/// Like [`mock_session`], with custom timeouts or credentials.
pub fn mock_session_with(
    config: ConnectionConfig,
) -> (Arc<RemoteSession<MockConnector>>, MockConnector) {
    let connector = MockConnector::new();
    let session = RemoteSession::new(config, connector.clone())
        .unwrap_or_else(|e| panic!("mock config rejected: {}", e));
    (Arc::new(session), connector)
}
