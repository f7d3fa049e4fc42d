use crate::types::Result;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Established duplex transport to the push-update server.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket factory for creating WebSocket connections
pub struct WebSocketFactory;

impl WebSocketFactory {
    /// Open a new WebSocket connection, performing the handshake.
    pub async fn create(url: &str) -> Result<WsStream> {
        tracing::debug!("opening WebSocket connection to {}", url);
        let (stream, _response) = connect_async(url).await?;
        Ok(stream)
    }
}
