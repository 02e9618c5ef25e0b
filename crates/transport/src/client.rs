use crate::frame::Frame;
use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use noor_bridge_engine::Origin;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REPLY_TIMEOUT: Duration = Duration::from_secs(20);

pub struct UiClient {
    ws: Ws,
    next_id: u64,
}

impl UiClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (mut ws, _) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        let hello = Frame::Hello { origin: Origin::Ui };
        ws.send(Message::Text(hello.to_text())).await?;
        Ok(Self { ws, next_id: 1 })
    }

    pub async fn request(&mut self, command: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        self.ws
            .send(Message::Text(Frame::Command { id, command }.to_text()))
            .await?;

        tokio::time::timeout(REPLY_TIMEOUT, async {
            loop {
                match self.next_frame().await? {
                    Frame::Response { id: got, response } if got == id => return Ok(response),
                    _ => continue,
                }
            }
        })
        .await
        .context("timed out waiting for a response")?
    }

    pub async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::parse(&text)?),
                Some(Ok(Message::Close(_))) | None => bail!("connection closed"),
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err.into()),
            }
        }
    }
}
