//! Ping/pong liveness for push connections

use std::time::Duration;

use busysync_domain::constants::{EVENT_PING, EVENT_PONG};
use busysync_domain::{BusySyncError, PushMessage, Result};
use tracing::debug;

use super::registry::ConnectionSender;

/// Inbound message from a push connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Pong,
    Other(PushMessage),
}

/// Parse a client frame.
///
/// # Errors
/// Returns `BusySyncError::Validation` for frames that are not a push
/// message.
pub fn parse_client_message(text: &str) -> Result<ClientMessage> {
    let message: PushMessage = serde_json::from_str(text)
        .map_err(|e| BusySyncError::Validation(format!("Malformed client message: {e}")))?;
    if message.event == EVENT_PONG {
        Ok(ClientMessage::Pong)
    } else {
        Ok(ClientMessage::Other(message))
    }
}

/// Ping the connection every `period`, starting immediately. Returns once
/// the connection's writer queue is closed.
pub async fn run_ping_loop(sender: ConnectionSender, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        if sender.send(PushMessage::control(EVENT_PING)).is_err() {
            debug!("Connection closed, stopping ping loop");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pings_immediately_then_on_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_ping_loop(tx, Duration::from_secs(10)));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event, "ping");
        assert!(first.data.is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(rx.recv().await.unwrap().event, "ping");

        drop(rx);
        tokio::time::advance(Duration::from_secs(10)).await;
        handle.await.unwrap();
    }

    #[test]
    fn pong_is_recognised() {
        assert_eq!(parse_client_message(r#"{"event":"pong"}"#).unwrap(), ClientMessage::Pong);
    }

    #[test]
    fn other_events_pass_through() {
        match parse_client_message(r#"{"event":"hello","data":{"a":1}}"#).unwrap() {
            ClientMessage::Other(message) => assert_eq!(message.event, "hello"),
            ClientMessage::Pong => panic!("expected other message"),
        }
    }

    #[test]
    fn malformed_frames_are_validation_errors() {
        assert!(matches!(parse_client_message("not json"), Err(BusySyncError::Validation(_))));
        assert!(matches!(parse_client_message(r#"{"data":1}"#), Err(BusySyncError::Validation(_))));
    }
}
