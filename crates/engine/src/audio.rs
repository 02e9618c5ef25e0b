use noor_bridge_host::{AudioEventSink, AudioHandle, AudioHost, LoadFailure, TaggedAudioEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

// Every load detaches the previous handle and bumps the generation so late
// events from it can be told apart.
pub struct AudioEngine {
    host: Arc<dyn AudioHost>,
    handle: Option<Arc<dyn AudioHandle>>,
    generation: u64,
    events: mpsc::UnboundedSender<TaggedAudioEvent>,
    load_timeout: Duration,
}

impl AudioEngine {
    pub fn new(
        host: Arc<dyn AudioHost>,
        events: mpsc::UnboundedSender<TaggedAudioEvent>,
        load_timeout: Duration,
    ) -> Self {
        Self {
            host,
            handle: None,
            generation: 0,
            events,
            load_timeout,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.handle.is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.live().is_some()
    }

    pub fn live(&self) -> Option<Arc<dyn AudioHandle>> {
        self.handle.as_ref().filter(|h| h.is_alive()).cloned()
    }

    pub fn live_for(&self, url: &str) -> Option<Arc<dyn AudioHandle>> {
        self.live().filter(|h| h.url().as_str() == url)
    }

    pub fn detach(&mut self) -> Option<Arc<dyn AudioHandle>> {
        self.generation += 1;
        self.handle.take()
    }

    pub fn begin_load(&mut self) -> PendingLoad {
        let previous = self.detach();
        PendingLoad {
            host: self.host.clone(),
            sink: AudioEventSink::new(self.generation, self.events.clone()),
            previous,
            load_timeout: self.load_timeout,
        }
    }

    pub fn install(&mut self, loaded: LoadedAudio) -> Result<(), Arc<dyn AudioHandle>> {
        if loaded.generation != self.generation || self.handle.is_some() {
            return Err(loaded.handle);
        }
        self.handle = Some(loaded.handle);
        Ok(())
    }

    pub fn forget_context(&mut self) {
        self.handle = None;
    }

    pub fn duration(&self) -> Option<f64> {
        self.live().and_then(|h| h.duration_seconds())
    }
}

pub struct PendingLoad {
    host: Arc<dyn AudioHost>,
    sink: AudioEventSink,
    previous: Option<Arc<dyn AudioHandle>>,
    load_timeout: Duration,
}

impl PendingLoad {
    pub fn generation(&self) -> u64 {
        self.sink.generation()
    }

    pub async fn load(self, url: &Url) -> Result<LoadedAudio, LoadFailure> {
        if let Some(previous) = self.previous {
            debug!(url = %previous.url(), "tearing down audio handle");
            previous.unload().await;
        }
        let generation = self.sink.generation();
        let handle = match tokio::time::timeout(self.load_timeout, self.host.load(url, self.sink))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(LoadFailure::unavailable(format!(
                    "{} did not become playable within {}s",
                    url,
                    self.load_timeout.as_secs()
                )))
            }
        };
        let duration = handle.duration_seconds();
        Ok(LoadedAudio {
            generation,
            handle: Arc::from(handle),
            duration,
        })
    }
}

pub struct LoadedAudio {
    pub generation: u64,
    pub handle: Arc<dyn AudioHandle>,
    pub duration: Option<f64>,
}

pub async fn start(handle: &dyn AudioHandle, limit: Duration) -> Result<(), LoadFailure> {
    match tokio::time::timeout(limit, handle.play()).await {
        Ok(result) => result,
        Err(_) => Err(LoadFailure::unavailable("playback did not start in time")),
    }
}

pub async fn pause(handle: &dyn AudioHandle) -> Option<f64> {
    match handle.pause().await {
        Ok(position) => Some(position),
        Err(err) => {
            warn!(error = %err, "pause on audio handle failed");
            None
        }
    }
}

pub async fn seek(handle: &dyn AudioHandle, seconds: f64) -> bool {
    match handle.seek(seconds).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "seek on audio handle failed");
            false
        }
    }
}
