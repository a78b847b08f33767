//! An in-process transport connecting two [`Pair`]s directly via
//! `tokio::sync::mpsc`, with no serialization step — the natural
//! single-process substitute for a host/subprocess IPC channel, and the
//! crate's own test harness.

use super::{DisconnectHandle, Transport};
use crate::error::RpcError;
use crate::message::Message;
use crate::pair::Pair;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One end of an in-process duplex transport. Build a connected pair with
/// [`duplex`].
pub struct DuplexTransport {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<Message>,
}

impl Transport for DuplexTransport {
    fn attach(self, pair: &Arc<Pair>) -> DisconnectHandle {
        let DuplexTransport {
            outbound,
            mut inbound,
        } = self;

        pair.set_send(move |message| {
            outbound
                .send(message)
                .map_err(|_| RpcError::Transport("duplex peer dropped".into()))
        });

        let read_pair = pair.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                read_pair.incoming(message);
            }
        });

        DisconnectHandle::new(pair.clone(), task)
    }
}

/// Returns two connected [`DuplexTransport`]s: whatever one side sends
/// arrives, unserialized, as the other side's `incoming`.
pub fn duplex() -> (DuplexTransport, DuplexTransport) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        DuplexTransport {
            outbound: a_tx,
            inbound: b_rx,
        },
        DuplexTransport {
            outbound: b_tx,
            inbound: a_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::handler;
    use serde_json::Value;

    fn silent_sink() -> impl Fn(RpcError) + Send + Sync + 'static {
        |err| panic!("unexpected error routed to sink: {err}")
    }

    #[tokio::test]
    async fn call_resolves_across_a_connected_duplex_pair() {
        let left = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        let right = Pair::builder()
            .name("right")
            .error_sink(silent_sink())
            .build()
            .unwrap();

        right.expose(
            "add",
            handler(|params| async move {
                let a = params[0].as_i64().unwrap_or(0);
                let b = params[1].as_i64().unwrap_or(0);
                Ok(Value::from(a + b))
            }),
        );

        let (left_transport, right_transport) = duplex();
        let _left_handle = left_transport.attach(&left);
        let _right_handle = right_transport.attach(&right);

        let result = left
            .call("add", vec![Value::from(10), Value::from(5)])
            .await
            .unwrap();
        assert_eq!(result, Value::from(15));
    }

    #[tokio::test]
    async fn disconnect_replaces_send_with_a_no_op() {
        let left = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .call_timeout(std::time::Duration::from_millis(20))
            .build()
            .unwrap();
        let right = Pair::builder()
            .name("right")
            .error_sink(silent_sink())
            .build()
            .unwrap();

        let (left_transport, right_transport) = duplex();
        let left_handle = left_transport.attach(&left);
        let _right_handle = right_transport.attach(&right);

        left_handle.disconnect();
        let err = left.call("whatever", vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::MissingSendFunction));
    }
}
