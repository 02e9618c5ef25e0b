use crate::frame::Frame;
use crate::remote_audio::AudioBridge;
use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use noor_bridge_engine::{MessageRouter, Origin};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, warn};

const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ClientHub {
    ui: Mutex<HashMap<u64, mpsc::UnboundedSender<Frame>>>,
    bridge: Arc<AudioBridge>,
    next_conn: AtomicU64,
}

impl ClientHub {
    pub fn new(bridge: Arc<AudioBridge>) -> Arc<Self> {
        Arc::new(Self {
            ui: Mutex::new(HashMap::new()),
            bridge,
            next_conn: AtomicU64::new(1),
        })
    }

    pub fn bridge(&self) -> &Arc<AudioBridge> {
        &self.bridge
    }

    pub fn ui_count(&self) -> usize {
        self.ui.lock().map(|ui| ui.len()).unwrap_or(0)
    }

    pub fn broadcast(&self, frame: &Frame) -> usize {
        let Ok(mut ui) = self.ui.lock() else {
            return 0;
        };
        ui.retain(|_, tx| !tx.is_closed());
        ui.values()
            .filter(|tx| tx.send(frame.clone()).is_ok())
            .count()
    }

    fn register(&self, origin: Origin, tx: mpsc::UnboundedSender<Frame>) -> u64 {
        let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        match origin {
            Origin::Ui => {
                if let Ok(mut ui) = self.ui.lock() {
                    ui.insert(conn_id, tx);
                }
            }
            Origin::AudioContext => self.bridge.attach(conn_id, tx),
        }
        conn_id
    }

    fn unregister(&self, origin: Origin, conn_id: u64) {
        match origin {
            Origin::Ui => {
                if let Ok(mut ui) = self.ui.lock() {
                    ui.remove(&conn_id);
                }
            }
            Origin::AudioContext => self.bridge.detach(conn_id),
        }
    }
}

pub struct TransportServer {
    listener: TcpListener,
    hub: Arc<ClientHub>,
}

impl TransportServer {
    pub async fn bind(addr: &str, hub: Arc<ClientHub>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to listen on {addr}"))?;
        Ok(Self { listener, hub })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(self, router: Arc<MessageRouter>) -> Result<()> {
        info!(addr = %self.local_addr()?, "transport listening");
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };
            let hub = self.hub.clone();
            let router = router.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, hub, router).await {
                    debug!(peer = %peer, error = %err, "connection ended with error");
                }
            });
        }
    }
}

type Ws = WebSocketStream<TcpStream>;

async fn read_hello(ws: &mut Ws) -> Result<Origin> {
    let first = tokio::time::timeout(HELLO_TIMEOUT, ws.next())
        .await
        .context("client sent no hello")?;
    match first {
        Some(Ok(Message::Text(text))) => match Frame::parse(&text) {
            Ok(Frame::Hello { origin }) => Ok(origin),
            Ok(other) => bail!("expected hello, got {other:?}"),
            Err(err) => bail!("malformed hello: {err}"),
        },
        Some(Ok(other)) => bail!("expected text hello, got {other:?}"),
        Some(Err(err)) => Err(err.into()),
        None => bail!("closed before hello"),
    }
}

async fn handle_connection(
    stream: TcpStream,
    hub: Arc<ClientHub>,
    router: Arc<MessageRouter>,
) -> Result<()> {
    let mut ws = accept_async(stream).await.context("websocket handshake")?;
    let origin = read_hello(&mut ws).await?;

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let conn_id = hub.register(origin, tx.clone());
    debug!(conn_id, origin = ?origin, "client connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_text())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = source.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!(conn_id, error = %err, "read failed");
                break;
            }
        };
        let frame = match Frame::parse(&text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(conn_id, error = %err, "ignoring malformed frame");
                continue;
            }
        };
        match frame {
            Frame::Command { id, command } => {
                let router = router.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(response) = router.handle(&command, origin).await {
                        let _ = tx.send(Frame::Response {
                            id,
                            response: response.to_value(),
                        });
                    }
                });
            }
            Frame::AudioReply(reply) if origin == Origin::AudioContext => {
                hub.bridge.complete(reply);
            }
            Frame::AudioEvent { event } if origin == Origin::AudioContext => {
                hub.bridge.forward(event);
            }
            other => debug!(conn_id, frame = ?other, "unexpected frame for this client"),
        }
    }

    hub.unregister(origin, conn_id);
    writer.abort();
    debug!(conn_id, "client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ClientHub, TransportServer};
    use crate::client::UiClient;
    use crate::frame::Frame;
    use crate::remote_audio::{AudioBridge, RemoteAudioHost};
    use crate::ui::UiNotifier;
    use futures_util::{SinkExt, StreamExt};
    use noor_bridge_core::DhikrCatalog;
    use noor_bridge_engine::{Coordinator, CoordinatorConfig, HostServices, MessageRouter};
    use noor_bridge_host::{
        LogNotificationHost, LogWindowHost, MemoryStore, NotificationSpec, PageNotifier,
        TemplateResolver, TokioAlarmHost,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    async fn start() -> (String, Arc<ClientHub>) {
        let bridge = AudioBridge::new(Duration::from_secs(2));
        let hub = ClientHub::new(bridge.clone());
        let (alarms, _fired) = TokioAlarmHost::new();
        let cfg = CoordinatorConfig::default();
        let cooldown = cfg.dedup_cooldown;
        let coordinator = Coordinator::new(
            HostServices {
                storage: Arc::new(MemoryStore::new()),
                audio: Arc::new(RemoteAudioHost::new(bridge)),
                notifications: Arc::new(LogNotificationHost::new()),
                permission: None,
                page: Arc::new(UiNotifier::new(hub.clone())),
                windows: Arc::new(LogWindowHost),
                alarms: Arc::new(alarms),
                resolver: Arc::new(TemplateResolver::new("https://cdn.example/{source}/{track}.mp3")),
                catalog: DhikrCatalog::builtin(),
            },
            cfg,
        );
        let router = Arc::new(MessageRouter::new(coordinator, cooldown));
        let server = TransportServer::bind("127.0.0.1:0", hub.clone()).await.unwrap();
        let url = format!("ws://{}", server.local_addr().unwrap());
        tokio::spawn(server.serve(router));
        (url, hub)
    }

    #[tokio::test]
    async fn ui_ping_round_trip() {
        let (url, _hub) = start().await;
        let mut client = UiClient::connect(&url).await.unwrap();
        let response = client.request(json!({"action": "ping"})).await.unwrap();
        assert_eq!(response, json!({"success": true, "message": "pong"}));
    }

    #[tokio::test]
    async fn unknown_action_over_the_wire() {
        let (url, _hub) = start().await;
        let mut client = UiClient::connect(&url).await.unwrap();
        let response = client.request(json!({"action": "teleport"})).await.unwrap();
        assert_eq!(
            response,
            json!({"success": false, "error": "Unknown action: teleport"})
        );
    }

    #[tokio::test]
    async fn audio_context_commands_are_not_answered() {
        let (url, _hub) = start().await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        ws.send(Message::Text(
            json!({"type": "hello", "origin": "audioContext"}).to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            json!({"type": "command", "id": 1, "command": {"action": "ping"}}).to_string(),
        ))
        .await
        .unwrap();
        let reply = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
        assert!(reply.is_err(), "audio context got a reply: {reply:?}");
    }

    #[tokio::test]
    async fn play_without_audio_context_fails_cleanly() {
        let (url, _hub) = start().await;
        let mut client = UiClient::connect(&url).await.unwrap();
        let response = client
            .request(json!({
                "action": "play",
                "url": "https://cdn.example/husary/1.mp3",
                "trackId": "1",
                "sourceId": "husary"
            }))
            .await
            .unwrap();
        assert_eq!(response["success"], json!(false));
        let error = response["error"].as_str().unwrap();
        assert!(error.starts_with("Audio playback is not available right now"));
        assert!(!error.contains("different reciter"));
    }

    #[tokio::test]
    async fn page_notification_reaches_connected_ui() {
        let (url, hub) = start().await;
        let notifier = UiNotifier::new(hub.clone());
        let entry = DhikrCatalog::builtin().round_robin(0).clone();
        let spec = NotificationSpec::for_entry("Dhikr Reminder", &entry);
        assert!(notifier.notify(&spec, &entry).await.is_err());

        let mut client = UiClient::connect(&url).await.unwrap();
        client.request(json!({"action": "ping"})).await.unwrap();
        assert_eq!(hub.ui_count(), 1);
        notifier.notify(&spec, &entry).await.unwrap();
        match client.next_frame().await.unwrap() {
            Frame::Notification { title, entry: got } => {
                assert_eq!(title, "Dhikr Reminder");
                assert_eq!(got, entry);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
}
