use futures_util::{SinkExt, StreamExt};
use sync_protocol::Envelope;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::protocol::Message;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A thin WebSocket client for driving a real, running hub instance in
/// integration tests. The hub authenticates via a token *query parameter*,
/// not a header, so connecting only ever needs a URL.
pub struct HubTestClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl HubTestClient {
    /// `base_url` is the hub's `ws://host:port/ws` endpoint, without query
    /// parameters.
    pub async fn connect(
        base_url: &str,
        token: &str,
        device_id: &str,
        device_name: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let url = format!(
            "{base_url}?token={token}&device_id={device_id}&device_name={device_name}"
        );
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(envelope)?;
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receives the next application-level message, transparently skipping
    /// ping/pong control frames.
    pub async fn recv(&mut self) -> Result<Envelope, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let envelope: Envelope = serde_json::from_str(&text)?;
                    return Ok(envelope);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
