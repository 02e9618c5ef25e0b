use crate::frame::{AudioOp, AudioReply, Frame};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use noor_bridge_core::LoadReason;
use noor_bridge_host::{AudioEvent, AudioEventSink, AudioHandle, AudioHost, LoadFailure};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

struct Link {
    conn_id: u64,
    tx: mpsc::UnboundedSender<Frame>,
}

#[derive(Default)]
struct BridgeState {
    link: Option<Link>,
    pending: HashMap<u64, oneshot::Sender<AudioReply>>,
    active: Option<AudioEventSink>,
}

pub struct AudioBridge {
    state: Mutex<BridgeState>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

fn lock(state: &Mutex<BridgeState>) -> MutexGuard<'_, BridgeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AudioBridge {
    pub fn new(request_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BridgeState::default()),
            next_id: AtomicU64::new(1),
            request_timeout,
        })
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.state).link.is_some()
    }

    pub fn attach(&self, conn_id: u64, tx: mpsc::UnboundedSender<Frame>) {
        let mut state = lock(&self.state);
        if state.link.is_some() {
            warn!(conn_id, "second audio context attached; replacing the first");
            Self::lose_context(&mut state);
        }
        state.link = Some(Link { conn_id, tx });
        info!(conn_id, "audio context attached");
    }

    pub fn detach(&self, conn_id: u64) {
        let mut state = lock(&self.state);
        if state.link.as_ref().map(|l| l.conn_id) != Some(conn_id) {
            return;
        }
        info!(conn_id, "audio context detached");
        Self::lose_context(&mut state);
    }

    fn lose_context(state: &mut BridgeState) {
        state.link = None;
        // Dropping the senders wakes every waiter with a closed-channel error.
        state.pending.clear();
        if let Some(sink) = state.active.take() {
            sink.emit(AudioEvent::ContextLost);
        }
    }

    pub fn complete(&self, reply: AudioReply) {
        let waiter = lock(&self.state).pending.remove(&reply.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!(id = reply.id, "reply for unknown or expired audio request"),
        }
    }

    pub fn forward(&self, event: AudioEvent) {
        let sink = lock(&self.state).active.clone();
        match sink {
            Some(sink) => {
                sink.emit(event);
            }
            None => debug!(event = ?event, "audio event with no loaded handle"),
        }
    }

    fn holds(&self, generation: u64) -> bool {
        let state = lock(&self.state);
        state.link.is_some()
            && state.active.as_ref().map(|s| s.generation()) == Some(generation)
    }

    async fn request(&self, op: AudioOp) -> Result<AudioReply, LoadFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = op.name();
        let rx = {
            let mut state = lock(&self.state);
            let Some(link) = state.link.as_ref() else {
                return Err(LoadFailure::unavailable("no audio context is connected"));
            };
            if link.tx.send(Frame::Audio { id, op }).is_err() {
                return Err(LoadFailure::unavailable("audio context connection closed"));
            }
            let (tx, rx) = oneshot::channel();
            state.pending.insert(id, tx);
            rx
        };

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(LoadFailure::unavailable(format!(
                "audio context went away during {name}"
            ))),
            Err(_) => {
                lock(&self.state).pending.remove(&id);
                Err(LoadFailure::unavailable(format!("audio context did not answer {name}")))
            }
        }
    }

    async fn request_ok(&self, op: AudioOp) -> Result<AudioReply, LoadFailure> {
        let reply = self.request(op).await?;
        if reply.ok {
            Ok(reply)
        } else {
            Err(LoadFailure::new(
                reply.reason.unwrap_or(LoadReason::Network),
                reply.error.unwrap_or_else(|| "audio context reported a failure".to_string()),
            ))
        }
    }
}

#[derive(Clone)]
pub struct RemoteAudioHost {
    bridge: Arc<AudioBridge>,
}

impl RemoteAudioHost {
    pub fn new(bridge: Arc<AudioBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl AudioHost for RemoteAudioHost {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn load(
        &self,
        url: &Url,
        sink: AudioEventSink,
    ) -> Result<Box<dyn AudioHandle>, LoadFailure> {
        let generation = sink.generation();
        let reply = self
            .bridge
            .request_ok(AudioOp::Load {
                url: url.to_string(),
            })
            .await?;
        lock(&self.bridge.state).active = Some(sink);
        debug!(url = %url, generation, "remote audio loaded");
        Ok(Box::new(RemoteHandle {
            bridge: self.bridge.clone(),
            url: url.clone(),
            generation,
            duration: reply.duration_seconds.filter(|d| d.is_finite() && *d > 0.0),
        }))
    }
}

struct RemoteHandle {
    bridge: Arc<AudioBridge>,
    url: Url,
    generation: u64,
    duration: Option<f64>,
}

impl RemoteHandle {
    fn ensure_alive(&self) -> Result<(), LoadFailure> {
        if self.bridge.holds(self.generation) {
            Ok(())
        } else {
            Err(LoadFailure::unavailable("audio handle was replaced or lost"))
        }
    }
}

#[async_trait]
impl AudioHandle for RemoteHandle {
    fn url(&self) -> &Url {
        &self.url
    }

    fn is_alive(&self) -> bool {
        self.bridge.holds(self.generation)
    }

    fn duration_seconds(&self) -> Option<f64> {
        self.duration
    }

    async fn play(&self) -> Result<(), LoadFailure> {
        self.ensure_alive()?;
        self.bridge.request_ok(AudioOp::Play).await.map(|_| ())
    }

    async fn pause(&self) -> Result<f64> {
        self.ensure_alive()?;
        let reply = self.bridge.request_ok(AudioOp::Pause).await?;
        reply
            .position_seconds
            .ok_or_else(|| anyhow!("pause reply carried no position"))
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        self.ensure_alive()?;
        self.bridge
            .request_ok(AudioOp::Seek {
                time_seconds: seconds,
            })
            .await?;
        Ok(())
    }

    async fn position_seconds(&self) -> Result<f64> {
        self.ensure_alive()?;
        let reply = self.bridge.request_ok(AudioOp::Position).await?;
        reply
            .position_seconds
            .ok_or_else(|| anyhow!("position reply carried no position"))
    }

    async fn unload(&self) {
        if !self.bridge.holds(self.generation) {
            return;
        }
        if let Err(err) = self.bridge.request(AudioOp::Unload).await {
            debug!(error = %err, "unload not acknowledged");
        }
        let mut state = lock(&self.bridge.state);
        if state.active.as_ref().map(|s| s.generation()) == Some(self.generation) {
            state.active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioBridge, RemoteAudioHost};
    use crate::frame::{AudioOp, AudioReply, Frame};
    use noor_bridge_core::LoadReason;
    use noor_bridge_host::{AudioEvent, AudioEventSink, AudioHandle, AudioHost};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use url::Url;

    fn spawn_context(bridge: Arc<AudioBridge>, mut rx: mpsc::UnboundedReceiver<Frame>, fail_load: bool) {
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let Frame::Audio { id, op } = frame else {
                    continue;
                };
                let reply = match op {
                    AudioOp::Load { .. } if fail_load => AudioReply {
                        id,
                        ok: false,
                        error: Some("MEDIA_ERR_SRC_NOT_SUPPORTED".to_string()),
                        reason: Some(LoadReason::UnsupportedFormat),
                        ..AudioReply::default()
                    },
                    AudioOp::Load { .. } => AudioReply {
                        id,
                        ok: true,
                        duration_seconds: Some(321.0),
                        ..AudioReply::default()
                    },
                    AudioOp::Pause | AudioOp::Position => AudioReply {
                        id,
                        ok: true,
                        position_seconds: Some(12.0),
                        ..AudioReply::default()
                    },
                    _ => AudioReply {
                        id,
                        ok: true,
                        ..AudioReply::default()
                    },
                };
                bridge.complete(reply);
            }
        });
    }

    fn url() -> Url {
        Url::parse("https://cdn.example/husary/001.mp3").unwrap()
    }

    #[tokio::test]
    async fn load_without_context_is_unavailable() {
        let bridge = AudioBridge::new(Duration::from_secs(1));
        let host = RemoteAudioHost::new(bridge);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = host.load(&url(), AudioEventSink::new(1, tx)).await.err().unwrap();
        assert_eq!(err.reason, LoadReason::Unavailable);
    }

    #[tokio::test]
    async fn load_round_trip_reports_duration() {
        let bridge = AudioBridge::new(Duration::from_secs(1));
        let (ctx_tx, ctx_rx) = mpsc::unbounded_channel();
        bridge.attach(1, ctx_tx);
        spawn_context(bridge.clone(), ctx_rx, false);

        let host = RemoteAudioHost::new(bridge.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = host.load(&url(), AudioEventSink::new(4, tx)).await.unwrap();
        assert_eq!(handle.duration_seconds(), Some(321.0));
        assert!(handle.is_alive());
        handle.play().await.unwrap();
        assert_eq!(handle.pause().await.unwrap(), 12.0);
    }

    #[tokio::test]
    async fn rejected_load_keeps_reported_reason() {
        let bridge = AudioBridge::new(Duration::from_secs(1));
        let (ctx_tx, ctx_rx) = mpsc::unbounded_channel();
        bridge.attach(1, ctx_tx);
        spawn_context(bridge.clone(), ctx_rx, true);

        let host = RemoteAudioHost::new(bridge);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = host.load(&url(), AudioEventSink::new(1, tx)).await.err().unwrap();
        assert_eq!(err.reason, LoadReason::UnsupportedFormat);
    }

    #[tokio::test]
    async fn detach_raises_context_lost_on_live_handle() {
        let bridge = AudioBridge::new(Duration::from_secs(1));
        let (ctx_tx, ctx_rx) = mpsc::unbounded_channel();
        bridge.attach(9, ctx_tx);
        spawn_context(bridge.clone(), ctx_rx, false);

        let host = RemoteAudioHost::new(bridge.clone());
        let (tx, mut events) = mpsc::unbounded_channel();
        let handle = host.load(&url(), AudioEventSink::new(2, tx)).await.unwrap();

        bridge.forward(AudioEvent::Ended);
        bridge.detach(9);
        assert!(!handle.is_alive());
        assert_eq!(events.recv().await.unwrap().event, AudioEvent::Ended);
        let lost = events.recv().await.unwrap();
        assert_eq!(lost.generation, 2);
        assert_eq!(lost.event, AudioEvent::ContextLost);
        assert!(handle.play().await.is_err());
    }

    #[tokio::test]
    async fn stale_detach_is_ignored() {
        let bridge = AudioBridge::new(Duration::from_secs(1));
        let (first, _a) = mpsc::unbounded_channel();
        let (second, _b) = mpsc::unbounded_channel();
        bridge.attach(1, first);
        bridge.attach(2, second);
        bridge.detach(1);
        assert!(bridge.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_context_times_out() {
        let bridge = AudioBridge::new(Duration::from_secs(2));
        let (ctx_tx, _ctx_rx) = mpsc::unbounded_channel();
        bridge.attach(1, ctx_tx);
        let host = RemoteAudioHost::new(bridge);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = host.load(&url(), AudioEventSink::new(1, tx)).await.err().unwrap();
        assert!(err.detail.contains("did not answer load"));
    }
}
