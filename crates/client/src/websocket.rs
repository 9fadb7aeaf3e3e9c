//! WebSocket-Transport
//!
//! Jeder Umschlag ist ein JSON-Textframe. Die `x-oct-*`-Header gehen beim
//! Upgrade mit. Ein Lese-Task wandelt eingehende Frames in [`Message`]s
//! um; Frames die sich nicht parsen lassen werden geloggt und verworfen.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use oct_protocol::transport::{WEBSOCKET_ID, WEBSOCKET_PFAD};
use oct_protocol::{Message, MessageTransport, TransportError, TransportProvider, TransportVerbindung};
use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Groesse der Eingangs-Queue
const EINGANG_GROESSE: usize = 256;

type Schreiber = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// http(s) -> ws(s)
fn ws_url(basis_url: &str) -> String {
    let basis = basis_url.trim_end_matches('/');
    let basis = if let Some(rest) = basis.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = basis.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        basis.to_string()
    };
    format!("{basis}{WEBSOCKET_PFAD}")
}

/// [`TransportProvider`] fuer WebSocket-Verbindungen
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransportProvider;

impl WebSocketTransportProvider {
    pub fn neu() -> Self {
        Self
    }
}

#[async_trait]
impl TransportProvider for WebSocketTransportProvider {
    fn id(&self) -> &str {
        WEBSOCKET_ID
    }

    async fn verbinden(
        &self,
        basis_url: &str,
        headers: HashMap<String, String>,
    ) -> Result<TransportVerbindung, TransportError> {
        let url = ws_url(basis_url);
        let mut anfrage = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Verbindung(e.to_string()))?;

        for (name, wert) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Verbindung(format!("Header {name}: {e}")))?;
            let wert = HeaderValue::from_str(&wert)
                .map_err(|e| TransportError::Verbindung(format!("Header {name}: {e}")))?;
            anfrage.headers_mut().insert(name, wert);
        }

        tracing::info!(url = %url, "Verbinde WebSocket");
        let (stream, _) = connect_async(anfrage)
            .await
            .map_err(|e| TransportError::Verbindung(e.to_string()))?;
        let (schreiber, mut leser) = stream.split();

        let (tx, eingang) = mpsc::channel(EINGANG_GROESSE);
        let lese_task = tokio::spawn(async move {
            while let Some(frame) = leser.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match Message::from_json(&text) {
                        Ok(nachricht) => {
                            if tx.send(nachricht).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(fehler = %e, "Ungueltiger Frame verworfen");
                        }
                    },
                    Ok(WsMessage::Close(grund)) => {
                        tracing::debug!(?grund, "WebSocket vom Server geschlossen");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(fehler = %e, "WebSocket-Fehler");
                        break;
                    }
                }
            }
        });

        Ok(TransportVerbindung {
            transport: Box::new(WebSocketTransport {
                schreiber: Mutex::new(schreiber),
                lese_task,
            }),
            eingang,
        })
    }
}

/// Offene WebSocket-Verbindung (Sende-Seite)
struct WebSocketTransport {
    schreiber: Mutex<Schreiber>,
    lese_task: JoinHandle<()>,
}

#[async_trait]
impl MessageTransport for WebSocketTransport {
    async fn senden(&self, nachricht: Message) -> Result<(), TransportError> {
        let json = nachricht
            .to_json()
            .map_err(|e| TransportError::UngueltigeNachricht(e.to_string()))?;
        self.schreiber
            .lock()
            .await
            .send(WsMessage::Text(json))
            .await
            .map_err(|_| TransportError::Geschlossen)
    }

    async fn schliessen(&self) {
        if let Err(e) = self.schreiber.lock().await.close().await {
            tracing::debug!(fehler = %e, "WebSocket bereits geschlossen");
        }
        self.lese_task.abort();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.lese_task.abort();
    }
}
