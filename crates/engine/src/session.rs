use crate::audio::{self, AudioEngine, LoadedAudio};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::persist;
use noor_bridge_core::model::sanitize_seconds;
use noor_bridge_core::MediaSessionState;
use noor_bridge_host::{AudioEvent, AudioHost, KeyValueStore, LoadFailure, TaggedAudioEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub load_timeout: Duration,
    pub position_persist_interval: Duration,
}

struct SessionInner {
    state: MediaSessionState,
    engine: AudioEngine,
    last_persist_at: Option<Instant>,
}

// Mutating commands run one at a time under `commands`; `inner` is never
// held across a load.
pub struct MediaSessionStore {
    commands: Mutex<()>,
    inner: Mutex<SessionInner>,
    storage: Arc<dyn KeyValueStore>,
    cfg: SessionConfig,
    persist_failures: AtomicU64,
}

impl MediaSessionStore {
    pub fn new(
        host: Arc<dyn AudioHost>,
        storage: Arc<dyn KeyValueStore>,
        cfg: SessionConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::new(Self {
            commands: Mutex::new(()),
            inner: Mutex::new(SessionInner {
                state: MediaSessionState::default(),
                engine: AudioEngine::new(host, tx, cfg.load_timeout),
                last_persist_at: None,
            }),
            storage,
            cfg,
            persist_failures: AtomicU64::new(0),
        });
        tokio::spawn(pump_events(Arc::downgrade(&store), rx));
        store
    }

    pub async fn restore(&self) -> CoordinatorResult<Option<MediaSessionState>> {
        let saved: Option<MediaSessionState> =
            persist::read(self.storage.as_ref(), persist::PLAYBACK_STATE).await?;
        let Some(mut saved) = saved else {
            return Ok(None);
        };
        saved.is_playing = false;
        saved.position_seconds = sanitize_seconds(saved.position_seconds);
        saved.duration_seconds = sanitize_seconds(saved.duration_seconds);

        let _command = self.commands.lock().await;
        let mut inner = self.inner.lock().await;
        if !inner.engine.is_alive() && !inner.state.has_track() {
            inner.state = saved.clone();
        }
        Ok(Some(saved))
    }

    pub async fn play(
        &self,
        url: &str,
        track_id: &str,
        source_id: &str,
    ) -> CoordinatorResult<MediaSessionState> {
        let parsed = parse_url(url)?;
        let _command = self.commands.lock().await;
        self.start_track(&parsed, url, track_id, source_id).await
    }

    pub async fn play_after(
        &self,
        ended: &MediaSessionState,
        url: &str,
        track_id: &str,
        source_id: &str,
    ) -> CoordinatorResult<Option<MediaSessionState>> {
        let parsed = parse_url(url)?;
        let _command = self.commands.lock().await;
        if !self.still_ended(ended).await {
            debug!(track_id, "session moved on; skipping follow-up play");
            return Ok(None);
        }
        self.start_track(&parsed, url, track_id, source_id).await.map(Some)
    }

    pub async fn pause(&self) -> CoordinatorResult<MediaSessionState> {
        let _command = self.commands.lock().await;
        let handle = {
            let inner = self.inner.lock().await;
            if !inner.state.has_track() {
                return Ok(inner.state.clone());
            }
            inner.engine.live()
        };

        let position = match handle {
            Some(handle) => audio::pause(handle.as_ref()).await,
            None => None,
        };

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if let Some(position) = position {
            inner.state.position_seconds = inner.state.clamp_position(position);
        }
        inner.state.is_playing = false;
        inner.state.touch();
        self.persist(inner).await;
        Ok(inner.state.clone())
    }

    pub async fn resume(&self) -> CoordinatorResult<MediaSessionState> {
        let _command = self.commands.lock().await;
        let (url, saved, live) = {
            let mut inner = self.inner.lock().await;
            let Some(url) = inner.state.track_url.clone() else {
                return Err(CoordinatorError::InvalidInput(
                    "there is no session to resume".to_string(),
                ));
            };
            if inner.state.is_end_of_track() {
                inner.state.position_seconds = 0.0;
            }
            let live = inner.engine.live_for(&url);
            (url, inner.state.position_seconds, live)
        };
        let limit = self.cfg.load_timeout;

        if let Some(handle) = live {
            if saved == 0.0 {
                audio::seek(handle.as_ref(), 0.0).await;
            }
            audio::start(handle.as_ref(), limit).await?;
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            inner.state.is_playing = true;
            inner.state.touch();
            self.persist(inner).await;
            return Ok(inner.state.clone());
        }

        info!(url = %url, position = saved, "audio context gone; recreating engine");
        let parsed = Url::parse(&url).map_err(CoordinatorError::internal)?;
        let (pending, known_duration) = {
            let mut inner = self.inner.lock().await;
            (inner.engine.begin_load(), inner.state.duration_seconds)
        };

        let reloaded = match pending.load(&parsed).await {
            Ok(loaded) => {
                let duration = loaded.duration.unwrap_or(known_duration);
                let target = clamp_to(saved, duration);
                if target > 0.0 && !audio::seek(loaded.handle.as_ref(), target).await {
                    warn!(target, "could not re-apply saved position");
                }
                started(loaded, limit).await.map(|loaded| (loaded, target))
            }
            Err(failure) => Err(failure),
        };

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        match reloaded {
            Ok((loaded, target)) => {
                if let Some(d) = loaded.duration {
                    inner.state.duration_seconds = d;
                }
                self.install(inner, loaded).await?;
                inner.state.position_seconds = target;
                inner.state.is_playing = true;
                inner.state.touch();
                self.persist(inner).await;
                Ok(inner.state.clone())
            }
            Err(failure) => {
                warn!(url = %url, reason = %failure.reason, "resume reload failed");
                inner.state.is_playing = false;
                inner.state.touch();
                self.persist(inner).await;
                Err(failure.into())
            }
        }
    }

    pub async fn seek(&self, seconds: f64) -> CoordinatorResult<MediaSessionState> {
        let _command = self.commands.lock().await;
        let (target, handle) = {
            let mut inner = self.inner.lock().await;
            if !inner.state.has_track() {
                return Err(CoordinatorError::InvalidInput(
                    "there is no session to seek in".to_string(),
                ));
            }
            if let Some(d) = inner.engine.duration() {
                inner.state.duration_seconds = d;
            }
            (inner.state.clamp_position(seconds), inner.engine.live())
        };

        // A dead handle keeps the target in state; resume applies it.
        if let Some(handle) = handle {
            audio::seek(handle.as_ref(), target).await;
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.state.position_seconds = target;
        inner.state.touch();
        self.persist(inner).await;
        Ok(inner.state.clone())
    }

    pub async fn get_state(&self) -> MediaSessionState {
        self.inner.lock().await.state.clone()
    }

    pub async fn has_engine(&self) -> bool {
        self.inner.lock().await.engine.is_alive()
    }

    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    pub async fn clear_after(&self, ended: &MediaSessionState) -> bool {
        let _command = self.commands.lock().await;
        if !self.still_ended(ended).await {
            return false;
        }
        self.teardown().await;
        true
    }

    async fn still_ended(&self, ended: &MediaSessionState) -> bool {
        let inner = self.inner.lock().await;
        inner.engine.is_alive()
            && inner.state.is_end_of_track()
            && inner.state.track_url == ended.track_url
            && inner.state.track_id == ended.track_id
            && inner.state.source_id == ended.source_id
    }

    async fn teardown(&self) {
        let previous = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let previous = inner.engine.detach();
            inner.state.clear();
            self.persist(inner).await;
            previous
        };
        if let Some(previous) = previous {
            previous.unload().await;
        }
    }

    // Caller holds the command lock.
    async fn start_track(
        &self,
        parsed: &Url,
        url: &str,
        track_id: &str,
        source_id: &str,
    ) -> CoordinatorResult<MediaSessionState> {
        let pending = {
            let mut inner = self.inner.lock().await;
            inner.state.is_playing = false;
            inner.engine.begin_load()
        };
        let loaded = match pending.load(parsed).await {
            Ok(loaded) => started(loaded, self.cfg.load_timeout).await,
            Err(failure) => Err(failure),
        };

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        match loaded {
            Ok(loaded) => {
                let duration = loaded.duration;
                self.install(inner, loaded).await?;
                inner.state = MediaSessionState::started(
                    url.to_string(),
                    track_id.to_string(),
                    source_id.to_string(),
                    duration.unwrap_or(0.0),
                );
                info!(track_id, source_id, "playback started");
                self.persist(inner).await;
                Ok(inner.state.clone())
            }
            Err(failure) => {
                warn!(url = %url, reason = %failure.reason, detail = %failure.detail, "play failed");
                inner.state.clear();
                self.persist(inner).await;
                Err(failure.into())
            }
        }
    }

    async fn install(&self, inner: &mut SessionInner, loaded: LoadedAudio) -> CoordinatorResult<()> {
        match inner.engine.install(loaded) {
            Ok(()) => Ok(()),
            Err(stale) => {
                warn!(url = %stale.url(), "load was overtaken by a newer one");
                stale.unload().await;
                Err(CoordinatorError::Internal(
                    "playback was replaced by a newer command".to_string(),
                ))
            }
        }
    }

    async fn apply_event(&self, tagged: TaggedAudioEvent) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.engine.is_current(tagged.generation) {
            debug!(
                generation = tagged.generation,
                current = inner.engine.generation(),
                "dropping event from replaced handle"
            );
            return;
        }

        match tagged.event {
            AudioEvent::TimeUpdate {
                position_seconds,
                duration_seconds,
            } => {
                if let Some(d) = duration_seconds.map(sanitize_seconds).filter(|d| *d > 0.0) {
                    inner.state.duration_seconds = d;
                }
                inner.state.position_seconds = inner.state.clamp_position(position_seconds);
                inner.state.touch();
                let due = inner
                    .last_persist_at
                    .map(|at| at.elapsed() >= self.cfg.position_persist_interval)
                    .unwrap_or(true);
                if due {
                    self.persist(inner).await;
                }
            }
            AudioEvent::Paused => {
                if inner.state.is_playing {
                    inner.state.is_playing = false;
                    inner.state.touch();
                    self.persist(inner).await;
                }
            }
            AudioEvent::Ended => {
                if inner.state.duration_seconds > 0.0 {
                    inner.state.position_seconds = inner.state.duration_seconds;
                }
                inner.state.is_playing = false;
                inner.state.touch();
                info!(track_id = ?inner.state.track_id, "track ended");
                self.persist(inner).await;
            }
            AudioEvent::ContextLost => {
                warn!(
                    position = inner.state.position_seconds,
                    "audio context vanished; session kept for resume"
                );
                inner.engine.forget_context();
                inner.state.is_playing = false;
                inner.state.touch();
                self.persist(inner).await;
            }
        }
    }

    async fn persist(&self, inner: &mut SessionInner) {
        inner.last_persist_at = Some(Instant::now());
        if let Err(err) =
            persist::write(self.storage.as_ref(), persist::PLAYBACK_STATE, &inner.state).await
        {
            let failures = self.persist_failures.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(error = %err, failures, "failed to persist playback state");
        }
    }
}

fn parse_url(url: &str) -> CoordinatorResult<Url> {
    Url::parse(url).map_err(|err| CoordinatorError::InvalidInput(format!("bad audio url {url}: {err}")))
}

fn clamp_to(position: f64, duration: f64) -> f64 {
    let position = sanitize_seconds(position);
    if duration > 0.0 {
        position.min(duration)
    } else {
        position
    }
}

// Starts a fresh handle; a handle that will not start is unloaded again.
async fn started(loaded: LoadedAudio, limit: Duration) -> Result<LoadedAudio, LoadFailure> {
    match audio::start(loaded.handle.as_ref(), limit).await {
        Ok(()) => Ok(loaded),
        Err(failure) => {
            loaded.handle.unload().await;
            Err(failure)
        }
    }
}

async fn pump_events(store: Weak<MediaSessionStore>, mut rx: mpsc::UnboundedReceiver<TaggedAudioEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(store) = store.upgrade() else {
            break;
        };
        store.apply_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::{MediaSessionStore, SessionConfig};
    use crate::error::CoordinatorError;
    use crate::persist;
    use crate::test_support::{FailingStore, GatedAudio};
    use noor_bridge_core::{LoadReason, MediaSessionState};
    use noor_bridge_host::{KeyValueStore, LoadFailure, MemoryStore, VirtualAudioHost};
    use std::sync::Arc;
    use std::time::Duration;

    const URL: &str = "https://cdn.example/husary/036.mp3";

    fn cfg() -> SessionConfig {
        SessionConfig {
            load_timeout: Duration::from_secs(15),
            position_persist_interval: Duration::from_secs(5),
        }
    }

    fn setup() -> (Arc<MediaSessionStore>, VirtualAudioHost, Arc<MemoryStore>) {
        let host = VirtualAudioHost::new(300.0);
        let storage = Arc::new(MemoryStore::new());
        let store = MediaSessionStore::new(Arc::new(host.clone()), storage.clone(), cfg());
        (store, host, storage)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn persisted(storage: &MemoryStore) -> MediaSessionState {
        persist::read(storage, persist::PLAYBACK_STATE)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn play_starts_at_zero_and_persists() {
        let (store, host, storage) = setup();
        let state = store.play(URL, "36", "husary").await.unwrap();

        assert!(state.is_playing);
        assert_eq!(state.position_seconds, 0.0);
        assert_eq!(state.duration_seconds, 300.0);
        assert_eq!(state.track_id.as_deref(), Some("36"));
        assert!(host.is_playing());
        assert_eq!(persisted(&storage).await, state);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_after_context_loss_keeps_position() {
        let (store, host, storage) = setup();
        store.play(URL, "36", "husary").await.unwrap();
        host.advance(42.0);
        settle().await;

        let paused = store.pause().await.unwrap();
        assert!(!paused.is_playing);
        assert_eq!(paused.position_seconds, 42.0);

        host.drop_context();
        settle().await;
        assert!(!store.has_engine().await);
        assert_eq!(store.get_state().await.position_seconds, 42.0);

        let resumed = store.resume().await.unwrap();
        assert!(resumed.is_playing);
        assert!((resumed.position_seconds - 42.0).abs() <= 1.0);
        assert!((host.current_position().unwrap() - 42.0).abs() <= 1.0);
        assert_eq!(host.load_count(), 2);
        assert_eq!(persisted(&storage).await.position_seconds, 42.0);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_in_place_does_not_reload() {
        let (store, host, _storage) = setup();
        store.play(URL, "36", "husary").await.unwrap();
        host.advance(10.0);
        settle().await;
        store.pause().await.unwrap();
        store.resume().await.unwrap();

        assert_eq!(host.load_count(), 1);
        assert!(host.is_playing());
        assert_eq!(host.current_position(), Some(10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn seek_clamps_to_known_duration() {
        let (store, host, _storage) = setup();
        store.play(URL, "36", "husary").await.unwrap();

        let state = store.seek(1_000.0).await.unwrap();
        assert_eq!(state.position_seconds, 300.0);
        assert_eq!(host.current_position(), Some(300.0));

        let state = store.seek(-5.0).await.unwrap();
        assert_eq!(state.position_seconds, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_without_duration_applies_directly() {
        let (store, host, _storage) = setup();
        host.set_duration_for(URL, 0.0);
        store.play(URL, "36", "husary").await.unwrap();
        let state = store.seek(1_000.0).await.unwrap();
        assert_eq!(state.position_seconds, 1_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn load_failure_reports_reason_and_clears_session() {
        let (store, host, _storage) = setup();
        store.play(URL, "36", "husary").await.unwrap();
        host.fail_next_load(LoadFailure::new(LoadReason::UnsupportedFormat, "audio/ogg"));

        let err = store.play(URL, "37", "husary").await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Load {
                reason: LoadReason::UnsupportedFormat,
                ..
            }
        ));
        let state = store.get_state().await;
        assert!(!state.is_playing);
        assert!(state.track_url.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_block_surfaces_as_load_error() {
        let (store, host, _storage) = setup();
        host.fail_next_play(LoadFailure::new(
            LoadReason::BlockedByAutoplayPolicy,
            "user gesture required",
        ));
        let err = store.play(URL, "36", "husary").await.unwrap_err();
        assert!(err.to_string().contains("autoplay policy"));
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_track_is_detectable_and_persisted() {
        let (store, host, storage) = setup();
        store.play(URL, "36", "husary").await.unwrap();
        host.finish_current();
        settle().await;

        let state = store.get_state().await;
        assert!(state.is_end_of_track());
        assert!(persisted(&storage).await.is_end_of_track());
    }

    #[tokio::test(start_paused = true)]
    async fn position_ticks_are_throttled() {
        let (store, host, storage) = setup();
        store.play(URL, "36", "husary").await.unwrap();

        host.advance(1.0);
        settle().await;
        assert_eq!(store.get_state().await.position_seconds, 1.0);
        assert_eq!(persisted(&storage).await.position_seconds, 0.0);

        tokio::time::advance(Duration::from_secs(6)).await;
        host.advance(1.0);
        settle().await;
        assert_eq!(persisted(&storage).await.position_seconds, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_reconstructs_identity_but_not_playing() {
        let storage = Arc::new(MemoryStore::new());
        let saved = MediaSessionState {
            track_url: Some(URL.to_string()),
            track_id: Some("36".to_string()),
            source_id: Some("husary".to_string()),
            is_playing: true,
            position_seconds: 77.0,
            duration_seconds: 300.0,
            last_updated_at: 1,
        };
        persist::write(storage.as_ref(), persist::PLAYBACK_STATE, &saved)
            .await
            .unwrap();

        let host = VirtualAudioHost::new(300.0);
        let store = MediaSessionStore::new(Arc::new(host.clone()), storage.clone(), cfg());
        store.restore().await.unwrap();

        let state = store.get_state().await;
        assert!(!state.is_playing);
        assert_eq!(state.position_seconds, 77.0);
        assert_eq!(state.track_id.as_deref(), Some("36"));

        let resumed = store.resume().await.unwrap();
        assert_eq!(resumed.position_seconds, 77.0);
        assert_eq!(host.current_position(), Some(77.0));
    }

    #[tokio::test(start_paused = true)]
    async fn neutral_state_without_session() {
        let (store, _host, storage) = setup();
        let state = store.get_state().await;
        assert_eq!(state, MediaSessionState::default());
        assert!(storage.get(persist::PLAYBACK_STATE).await.unwrap().is_none());

        let paused = store.pause().await.unwrap();
        assert!(!paused.is_playing);
        assert!(store.resume().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_events_from_replaced_handle_are_ignored() {
        let (store, host, _storage) = setup();
        store.play(URL, "36", "husary").await.unwrap();
        host.advance(100.0);
        store.play(URL, "37", "husary").await.unwrap();
        settle().await;

        let state = store.get_state().await;
        assert_eq!(state.track_id.as_deref(), Some("37"));
        assert_eq!(state.position_seconds, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_load_times_out_without_an_engine() {
        let host = GatedAudio::new(VirtualAudioHost::new(300.0));
        let store = MediaSessionStore::new(Arc::new(host), Arc::new(MemoryStore::new()), cfg());
        let started = tokio::time::Instant::now();

        let err = store.play(URL, "36", "husary").await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Load {
                reason: LoadReason::Unavailable,
                ..
            }
        ));
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(!err.to_string().contains("different reciter"));
        assert!(!store.has_engine().await);
        assert!(store.get_state().await.track_url.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reads_stay_live_while_a_load_is_pending() {
        let virtual_host = VirtualAudioHost::new(300.0);
        let host = GatedAudio::new(virtual_host.clone());
        let store = MediaSessionStore::new(Arc::new(host.clone()), Arc::new(MemoryStore::new()), cfg());
        host.release();
        store.play(URL, "36", "husary").await.unwrap();

        let pending = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .play("https://cdn.example/husary/037.mp3", "37", "husary")
                    .await
            })
        };
        settle().await;

        let state = tokio::time::timeout(Duration::from_millis(10), store.get_state())
            .await
            .expect("getState blocked behind a load");
        assert_eq!(state.track_id.as_deref(), Some("36"));
        assert!(!state.is_playing);
        assert!(!store.has_engine().await);

        host.release();
        let state = pending.await.unwrap().unwrap();
        assert_eq!(state.track_id.as_deref(), Some("37"));
        assert!(store.has_engine().await);
        assert_eq!(virtual_host.load_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_play_yields_to_a_newer_play() {
        let (store, host, _storage) = setup();
        store.play(URL, "36", "husary").await.unwrap();
        host.finish_current();
        settle().await;
        let ended = store.get_state().await;
        assert!(ended.is_end_of_track());

        store
            .play("https://cdn.example/husary/050.mp3", "50", "husary")
            .await
            .unwrap();
        let skipped = store
            .play_after(&ended, "https://cdn.example/husary/037.mp3", "37", "husary")
            .await
            .unwrap();
        assert!(skipped.is_none());
        assert!(!store.clear_after(&ended).await);

        let state = store.get_state().await;
        assert_eq!(state.track_id.as_deref(), Some("50"));
        assert!(state.is_playing);
        assert_eq!(host.load_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_play_runs_while_the_track_is_still_ended() {
        let (store, host, _storage) = setup();
        store.play(URL, "36", "husary").await.unwrap();
        host.finish_current();
        settle().await;
        let ended = store.get_state().await;

        let next = store
            .play_after(&ended, "https://cdn.example/husary/037.mp3", "37", "husary")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.track_id.as_deref(), Some("37"));
        assert!(next.is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_writes_are_counted_but_do_not_fail_commands() {
        let host = VirtualAudioHost::new(300.0);
        let store = MediaSessionStore::new(Arc::new(host), Arc::new(FailingStore), cfg());
        assert_eq!(store.persist_failures(), 0);

        store.play(URL, "36", "husary").await.unwrap();
        store.seek(10.0).await.unwrap();
        assert_eq!(store.persist_failures(), 2);
    }
}
