//! WebSocket client: connect to the agent and pump its frames into a [`Hub`].

use std::{fs::File, io::BufReader, sync::Arc};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, tungstenite::Message, Connector,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::Hub;
use crate::error::ConnectionError;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Accept only ws:// and wss:// URLs.
pub fn validate_url(raw: &str) -> Result<Url, ConnectionError> {
    let url = Url::parse(raw).map_err(|e| ConnectionError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConnectionError::InvalidUrl(format!(
            "{raw}: unsupported scheme '{other}'"
        ))),
    }
}

// Connect to the agent and return the WS stream
pub async fn connect(url: &str, tls_ca: Option<&str>) -> Result<WsStream, ConnectionError> {
    let parsed = validate_url(url)?;
    let (ws, _) = match tls_ca {
        Some(ca_path) if parsed.scheme() == "wss" => {
            let connector = rustls_connector(ca_path)?;
            connect_async_tls_with_config(parsed.as_str(), None, false, Some(connector)).await
        }
        Some(_) => {
            warn!("--tls-ca ignored for non-TLS url {}", parsed);
            connect_async(parsed.as_str()).await
        }
        None => connect_async(parsed.as_str()).await,
    }
    .map_err(|e| ConnectionError::Connect(e.to_string()))?;
    info!("connected to {}", parsed);
    Ok(ws)
}

// Trust exactly the certificates in the given PEM file
fn rustls_connector(ca_path: &str) -> Result<Connector, ConnectionError> {
    let file = File::open(ca_path).map_err(|e| ConnectionError::Tls(format!("{ca_path}: {e}")))?;
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
        let cert = cert.map_err(|e| ConnectionError::Tls(format!("{ca_path}: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| ConnectionError::Tls(e.to_string()))?;
    }
    if roots.is_empty() {
        return Err(ConnectionError::Tls(format!(
            "{ca_path}: no certificates found"
        )));
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Connector::Rustls(Arc::new(config)))
}

/// Read frames until the peer goes away or the hub asks for teardown, then close the
/// hub with the reason. Malformed messages are dropped by the hub.
pub async fn pump(mut ws: WsStream, hub: Hub) -> ConnectionError {
    let reason = loop {
        tokio::select! {
            _ = hub.teardown_requested() => {
                debug!("teardown requested, closing socket");
                let _ = ws.send(Message::Close(None)).await;
                break ConnectionError::Shutdown;
            }
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    hub.ingest(&text);
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        hub.ingest(text);
                    }
                    Err(_) => warn!("dropping non-UTF-8 binary frame ({} bytes)", bytes.len()),
                },
                Some(Ok(Message::Close(_))) | None => break ConnectionError::ClosedByPeer,
                Some(Ok(_)) => {}
                Some(Err(e)) => break ConnectionError::Transport(e.to_string()),
            }
        }
    };
    hub.close(reason.clone());
    reason
}

/// Connect and pump; a connect failure also closes the hub so readers see it.
pub async fn run(url: &str, tls_ca: Option<&str>, hub: Hub) -> ConnectionError {
    match connect(url, tls_ca).await {
        Ok(ws) => pump(ws, hub).await,
        Err(e) => {
            hub.close(e.clone());
            e
        }
    }
}
