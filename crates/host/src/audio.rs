use anyhow::Result;
use async_trait::async_trait;
use noor_bridge_core::LoadReason;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}: {detail}")]
pub struct LoadFailure {
    pub reason: LoadReason,
    pub detail: String,
}

impl LoadFailure {
    pub fn new(reason: LoadReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(LoadReason::Unavailable, detail)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum AudioEvent {
    TimeUpdate {
        position_seconds: f64,
        duration_seconds: Option<f64>,
    },
    Paused,
    Ended,
    ContextLost,
}

#[derive(Debug, Clone)]
pub struct TaggedAudioEvent {
    pub generation: u64,
    pub event: AudioEvent,
}

#[derive(Debug, Clone)]
pub struct AudioEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedAudioEvent>,
}

impl AudioEventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedAudioEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: AudioEvent) -> bool {
        self.tx
            .send(TaggedAudioEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

#[async_trait]
pub trait AudioHandle: Send + Sync {
    fn url(&self) -> &Url;
    fn is_alive(&self) -> bool;
    fn duration_seconds(&self) -> Option<f64>;
    async fn play(&self) -> Result<(), LoadFailure>;
    async fn pause(&self) -> Result<f64>;
    async fn seek(&self, seconds: f64) -> Result<()>;
    async fn position_seconds(&self) -> Result<f64>;
    async fn unload(&self);
}

#[async_trait]
pub trait AudioHost: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self, url: &Url, sink: AudioEventSink)
        -> Result<Box<dyn AudioHandle>, LoadFailure>;
}
