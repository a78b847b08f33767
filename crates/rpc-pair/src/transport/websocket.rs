//! A WebSocket transport: one framed [`Message`] per text frame, wired
//! through the same `Transport::attach` contract every transport in this
//! crate implements.

use super::{DisconnectHandle, Transport};
use crate::error::RpcError;
use crate::message::Message;
use crate::pair::Pair;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected WebSocket, ready to be [`Transport::attach`]ed to a [`Pair`].
/// Sends one `Message::Text` frame per outbound message and parses each
/// inbound `Message::Text` frame as a [`Message`]; a `Message::Close` frame
/// ends the read loop cleanly.
pub struct WebSocketTransport {
    sender: SplitSink<WsStream, WsMessage>,
    receiver: SplitStream<WsStream>,
}

impl WebSocketTransport {
    /// Connects to `url`, sending `headers` as part of the WebSocket upgrade
    /// request (e.g. an `Authorization` header), and returns the connected
    /// transport.
    pub async fn connect(
        url: &str,
        headers: Option<HashMap<String, String>>,
    ) -> Result<Self, RpcError> {
        Url::parse(url).map_err(|e| RpcError::Transport(format!("invalid URL: {e}")))?;

        let mut request = url
            .into_client_request()
            .map_err(|e| RpcError::Transport(format!("failed to build request: {e}")))?;

        if let Some(headers_map) = headers {
            let header_map = request.headers_mut();
            for (k, v) in headers_map {
                let name = HeaderName::try_from(k.as_str())
                    .map_err(|e| RpcError::Transport(format!("invalid header name: {e}")))?;
                let value = HeaderValue::try_from(v.as_str())
                    .map_err(|e| RpcError::Transport(format!("invalid header value: {e}")))?;
                header_map.insert(name, value);
            }
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RpcError::Transport(format!("WebSocket connection failed: {e}")))?;

        let (sender, receiver) = ws_stream.split();
        Ok(WebSocketTransport { sender, receiver })
    }
}

impl Transport for WebSocketTransport {
    fn attach(self, pair: &Arc<Pair>) -> DisconnectHandle {
        let WebSocketTransport {
            mut sender,
            mut receiver,
        } = self;
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        pair.set_send(move |message| {
            outbound_tx
                .send(message)
                .map_err(|_| RpcError::Transport("websocket transport closed".into()))
        });

        let read_pair = pair.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(message) => {
                                let Ok(json) = serde_json::to_string(&message) else { continue };
                                if sender.send(WsMessage::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    incoming = receiver.next() => {
                        match incoming {
                            Some(Ok(WsMessage::Text(text))) => {
                                match serde_json::from_str::<Message>(&text) {
                                    Ok(message) => read_pair.incoming(message),
                                    Err(err) => tracing::warn!(%err, "websocket frame failed to parse as a rpc-pair message"),
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                tracing::warn!(%err, "websocket read error");
                                break;
                            }
                        }
                    }
                }
            }
        });

        DisconnectHandle::new(pair.clone(), task)
    }
}
