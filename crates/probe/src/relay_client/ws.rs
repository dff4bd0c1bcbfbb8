//! WebSocket peer: wait for the welcome, then send and/or print relayed frames.

use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use shared::{ChatMessage, SignalEnvelope, SystemMessage};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

type Stream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const WELCOME_TIMEOUT: Duration = Duration::from_secs(10);

/// One-line, human-readable rendering of a text frame.
pub fn describe_frame(text: &str) -> String {
    match SignalEnvelope::parse(text) {
        Some(SignalEnvelope::System(m)) => format!("[system {}] {}", m.timestamp, m.message),
        Some(SignalEnvelope::Chat(m)) => format!("[message] {}", m.text),
        Some(other) => format!("[{}] {}", other.kind(), text),
        None => format!("[raw] {}", text),
    }
}

async fn await_welcome(ws: &mut Stream) -> Result<SystemMessage> {
    while let Some(msg) = ws.next().await {
        if let Message::Text(t) = msg? {
            return match SignalEnvelope::parse(&t) {
                Some(SignalEnvelope::System(m)) => Ok(m),
                _ => Err(anyhow::anyhow!("expected system welcome, got: {}", t)),
            };
        }
    }
    anyhow::bail!("connection closed before welcome")
}

async fn connect(ws_url: &str) -> Result<Stream> {
    let (mut ws, _) = connect_async(ws_url).await?;
    tracing::info!("Connected to relay at {}", ws_url);

    let welcome = tokio::time::timeout(WELCOME_TIMEOUT, await_welcome(&mut ws))
        .await
        .map_err(|_| anyhow::anyhow!("no welcome within {:?}", WELCOME_TIMEOUT))??;
    println!("{}", describe_frame(&welcome.to_json()));
    Ok(ws)
}

/// Print frames until the relay closes the connection or `limit` elapses.
async fn print_frames(ws: &mut Stream, limit: Option<Duration>) -> Result<()> {
    let deadline = limit.map(|d| tokio::time::Instant::now() + d);
    loop {
        let next = match deadline {
            Some(at) => match tokio::time::timeout_at(at, ws.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(()),
            },
            None => ws.next().await,
        };
        match next {
            Some(Ok(Message::Text(t))) => println!("{}", describe_frame(&t)),
            Some(Ok(Message::Binary(b))) => println!("[binary] {} bytes", b.len()),
            Some(Ok(Message::Close(frame))) => {
                tracing::info!("Relay closed connection: {:?}", frame);
                return Ok(());
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        }
    }
}

pub async fn listen(ws_url: &str) -> Result<()> {
    let mut ws = connect(ws_url).await?;
    print_frames(&mut ws, None).await
}

pub async fn send_message(ws_url: &str, text: &str, wait: Duration) -> Result<()> {
    let mut ws = connect(ws_url).await?;
    let json = serde_json::to_string(&ChatMessage::new(text))?;
    ws.send(Message::Text(json)).await?;
    tracing::info!("Sent message ({} bytes)", text.len());

    if !wait.is_zero() {
        print_frames(&mut ws, Some(wait)).await?;
    }
    ws.close(None).await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_known_envelopes() {
        let welcome = SystemMessage::welcome();
        let line = describe_frame(&welcome.to_json());
        assert!(line.starts_with("[system "));
        assert!(line.ends_with("Connected to signaling server"));

        assert_eq!(
            describe_frame(r#"{"type":"message","text":"hi"}"#),
            "[message] hi"
        );
        assert_eq!(
            describe_frame(r#"{"ice":{"candidate":"c"}}"#),
            r#"[ice] {"ice":{"candidate":"c"}}"#
        );
        assert_eq!(describe_frame("hello"), "[raw] hello");
    }
}
