use crate::audio::{AudioEvent, AudioEventSink, AudioHandle, AudioHost, LoadFailure};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

struct VirtualTrack {
    position: f64,
    duration: f64,
    playing: bool,
    alive: bool,
    sink: AudioEventSink,
}

#[derive(Default)]
struct VirtualShared {
    default_duration: f64,
    durations: HashMap<String, f64>,
    pending_failures: Vec<LoadFailure>,
    play_failure: Option<LoadFailure>,
    loads: Vec<Url>,
    current: Option<Arc<Mutex<VirtualTrack>>>,
}

#[derive(Clone, Default)]
pub struct VirtualAudioHost {
    shared: Arc<Mutex<VirtualShared>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VirtualAudioHost {
    pub fn new(default_duration: f64) -> Self {
        let host = Self::default();
        lock(&host.shared).default_duration = default_duration;
        host
    }

    pub fn set_duration_for(&self, url: &str, seconds: f64) {
        lock(&self.shared)
            .durations
            .insert(url.to_string(), seconds);
    }

    pub fn fail_next_load(&self, failure: LoadFailure) {
        lock(&self.shared).pending_failures.push(failure);
    }

    pub fn fail_next_play(&self, failure: LoadFailure) {
        lock(&self.shared).play_failure = Some(failure);
    }

    pub fn load_count(&self) -> usize {
        lock(&self.shared).loads.len()
    }

    pub fn loaded_urls(&self) -> Vec<Url> {
        lock(&self.shared).loads.clone()
    }

    pub fn current_position(&self) -> Option<f64> {
        let shared = lock(&self.shared);
        shared.current.as_ref().map(|t| lock(t).position)
    }

    pub fn is_playing(&self) -> bool {
        let shared = lock(&self.shared);
        shared
            .current
            .as_ref()
            .map(|t| {
                let t = lock(t);
                t.alive && t.playing
            })
            .unwrap_or(false)
    }

    pub fn advance(&self, seconds: f64) {
        let current = lock(&self.shared).current.clone();
        let Some(track) = current else {
            return;
        };
        let mut t = lock(&track);
        if !t.alive || !t.playing {
            return;
        }
        t.position += seconds;
        let duration = (t.duration > 0.0).then_some(t.duration);
        if let Some(d) = duration {
            if t.position >= d {
                t.position = d;
                t.playing = false;
                t.sink.emit(AudioEvent::TimeUpdate {
                    position_seconds: d,
                    duration_seconds: Some(d),
                });
                t.sink.emit(AudioEvent::Ended);
                return;
            }
        }
        t.sink.emit(AudioEvent::TimeUpdate {
            position_seconds: t.position,
            duration_seconds: duration,
        });
    }

    pub fn finish_current(&self) {
        let current = lock(&self.shared).current.clone();
        if let Some(track) = current {
            let remaining = {
                let t = lock(&track);
                (t.duration - t.position).max(0.0)
            };
            self.advance(remaining);
        }
    }

    pub fn drop_context(&self) {
        let current = lock(&self.shared).current.take();
        if let Some(track) = current {
            let mut t = lock(&track);
            t.alive = false;
            t.playing = false;
            t.sink.emit(AudioEvent::ContextLost);
        }
    }

    pub fn spawn_clock(&self, tick: Duration) -> JoinHandle<()> {
        let host = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                host.advance(tick.as_secs_f64());
            }
        })
    }
}

#[async_trait]
impl AudioHost for VirtualAudioHost {
    fn name(&self) -> &'static str {
        "virtual"
    }

    async fn load(
        &self,
        url: &Url,
        sink: AudioEventSink,
    ) -> Result<Box<dyn AudioHandle>, LoadFailure> {
        let mut shared = lock(&self.shared);
        shared.loads.push(url.clone());
        if !shared.pending_failures.is_empty() {
            return Err(shared.pending_failures.remove(0));
        }
        let duration = shared
            .durations
            .get(url.as_str())
            .copied()
            .unwrap_or(shared.default_duration);

        if let Some(previous) = shared.current.take() {
            let mut prev = lock(&previous);
            prev.alive = false;
            prev.playing = false;
        }

        let track = Arc::new(Mutex::new(VirtualTrack {
            position: 0.0,
            duration,
            playing: false,
            alive: true,
            sink,
        }));
        shared.current = Some(track.clone());
        Ok(Box::new(VirtualHandle {
            url: url.clone(),
            track,
            shared: self.shared.clone(),
        }))
    }
}

struct VirtualHandle {
    url: Url,
    track: Arc<Mutex<VirtualTrack>>,
    shared: Arc<Mutex<VirtualShared>>,
}

impl VirtualHandle {
    fn live(&self) -> Result<MutexGuard<'_, VirtualTrack>> {
        let t = lock(&self.track);
        if t.alive {
            Ok(t)
        } else {
            Err(anyhow!("audio context is gone"))
        }
    }
}

#[async_trait]
impl AudioHandle for VirtualHandle {
    fn url(&self) -> &Url {
        &self.url
    }

    fn is_alive(&self) -> bool {
        lock(&self.track).alive
    }

    fn duration_seconds(&self) -> Option<f64> {
        let d = lock(&self.track).duration;
        (d > 0.0).then_some(d)
    }

    async fn play(&self) -> Result<(), LoadFailure> {
        if let Some(failure) = lock(&self.shared).play_failure.take() {
            return Err(failure);
        }
        let mut t = self
            .live()
            .map_err(|err| LoadFailure::unavailable(err.to_string()))?;
        t.playing = true;
        Ok(())
    }

    async fn pause(&self) -> Result<f64> {
        let mut t = self.live()?;
        t.playing = false;
        t.sink.emit(AudioEvent::Paused);
        Ok(t.position)
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        let mut t = self.live()?;
        t.position = seconds;
        Ok(())
    }

    async fn position_seconds(&self) -> Result<f64> {
        Ok(self.live()?.position)
    }

    async fn unload(&self) {
        let mut t = lock(&self.track);
        t.alive = false;
        t.playing = false;
    }
}
