//! Newline-delimited JSON over any `AsyncRead + AsyncWrite`: one JSON value
//! per line, buffering partial lines across reads.

use super::{DisconnectHandle, Transport};
use crate::message::Message;
use crate::pair::Pair;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};

/// Emitted on a `StreamTransport`'s own event channel — never routed through
/// the pair's error sink — when a line fails to parse as JSON. Carries the
/// offending `line` and the decode failure as `original`.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    ParseError { line: String, original: String },
}

/// Buffers partial lines across reads (via `BufReader::read_line`) and
/// writes one `serde_json::to_string` value followed by `\n` per outbound
/// message.
pub struct StreamTransport<R, W> {
    reader: R,
    writer: W,
    events: broadcast::Sender<TransportEvent>,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        let (events, _) = broadcast::channel(64);
        StreamTransport {
            reader,
            writer,
            events,
        }
    }

    /// Subscribes to this transport's parse-error events. Must be called
    /// before [`Transport::attach`] consumes `self`.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn attach(self, pair: &Arc<Pair>) -> DisconnectHandle {
        let StreamTransport {
            reader,
            mut writer,
            events,
        } = self;
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        pair.set_send(move |message| {
            outbound_tx
                .send(message)
                .map_err(|_| crate::error::RpcError::Transport("stream transport closed".into()))
        });

        let read_pair = pair.clone();
        let task = tokio::spawn(async move {
            let mut buf_reader = BufReader::new(reader);
            let mut line = String::new();
            loop {
                line.clear();
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(message) => {
                                let Ok(json) = serde_json::to_string(&message) else { continue };
                                if writer.write_all(json.as_bytes()).await.is_err() { break; }
                                if writer.write_all(b"\n").await.is_err() { break; }
                                if writer.flush().await.is_err() { break; }
                            }
                            None => break,
                        }
                    }
                    read = buf_reader.read_line(&mut line) => {
                        match read {
                            Ok(0) => break,
                            Ok(_) => {
                                let trimmed = line.trim_end_matches(['\n', '\r']);
                                if trimmed.is_empty() {
                                    continue;
                                }
                                match serde_json::from_str::<Message>(trimmed) {
                                    Ok(message) => read_pair.incoming(message),
                                    Err(err) => {
                                        let _ = events.send(TransportEvent::ParseError {
                                            line: trimmed.to_string(),
                                            original: err.to_string(),
                                        });
                                    }
                                }
                            }
                            Err(_) => break,
                        }
                    }
                }
            }
        });

        DisconnectHandle::new(pair.clone(), task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CallMessage, Message};
    use serde_json::Value;
    use std::time::Duration;

    fn silent_sink() -> impl Fn(crate::error::RpcError) + Send + Sync + 'static {
        |_| {}
    }

    #[tokio::test]
    async fn round_trips_a_call_message_across_a_duplex_pipe() {
        let (client_read, server_write) = tokio::io::duplex(4096);
        let (server_read, client_write) = tokio::io::duplex(4096);

        let client = Pair::builder()
            .name("client")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        let client_transport = StreamTransport::new(client_read, client_write);
        let _client_handle = client_transport.attach(&client);

        let server = Pair::builder()
            .name("server")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        server.expose(
            "echo",
            crate::pair::handler(|params| async move { Ok(params[0].clone()) }),
        );
        let server_transport = StreamTransport::new(server_read, server_write);
        let _server_handle = server_transport.attach(&server);

        let result = client
            .call("echo", vec![Value::from("hello")])
            .await
            .unwrap();
        assert_eq!(result, Value::from("hello"));
    }

    #[tokio::test]
    async fn malformed_line_emits_parse_error_without_tearing_down_pair() {
        let (read_half, mut write_half) = tokio::io::duplex(4096);
        let (_unused_read, write_for_pair) = tokio::io::duplex(4096);

        let pair = Pair::builder()
            .name("server")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        let transport = StreamTransport::new(read_half, write_for_pair);
        let mut events = transport.subscribe_events();
        let _handle = transport.attach(&pair);

        use tokio::io::AsyncWriteExt;
        write_half.write_all(b"not json\n").await.unwrap();

        let good = Message::Call(CallMessage {
            id: "client:1".into(),
            method: "ping".into(),
            params: vec![],
        });
        write_half
            .write_all(format!("{}\n", serde_json::to_string(&good).unwrap()).as_bytes())
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_millis(200), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            TransportEvent::ParseError { line, .. } => assert_eq!(line, "not json"),
        }
    }
}
