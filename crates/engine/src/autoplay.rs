use crate::error::CoordinatorError;
use crate::persist;
use crate::session::MediaSessionStore;
use noor_bridge_core::{next_track_id, UserSelection};
use noor_bridge_host::{AudioUrlResolver, KeyValueStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    NoSession,
    AutoplayDisabled,
    NoNextTrack,
    Failed(CoordinatorError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Waiting,
    Advanced { track_id: String },
    Stopped(StopReason),
}

pub struct AutoplayMonitor {
    session: Arc<MediaSessionStore>,
    resolver: Arc<dyn AudioUrlResolver>,
    storage: Arc<dyn KeyValueStore>,
    poll: Duration,
    max_track_id: u32,
    task: Mutex<Option<JoinHandle<()>>>,
    advanced: AtomicU64,
}

impl AutoplayMonitor {
    pub fn new(
        session: Arc<MediaSessionStore>,
        resolver: Arc<dyn AudioUrlResolver>,
        storage: Arc<dyn KeyValueStore>,
        poll: Duration,
        max_track_id: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            resolver,
            storage,
            poll,
            max_track_id,
            task: Mutex::new(None),
            advanced: AtomicU64::new(0),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let monitor = self.clone();
        let task = tokio::spawn(async move { monitor.run().await });
        if let Ok(mut slot) = self.task.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }

    pub fn stop(&self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|slot| slot.as_ref().map(|t| !t.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn advanced(&self) -> u64 {
        self.advanced.load(Ordering::Relaxed)
    }

    async fn run(&self) {
        let mut ticker = interval_at(Instant::now() + self.poll, self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.tick().await {
                TickOutcome::Waiting => {}
                TickOutcome::Advanced { track_id } => {
                    debug!(track_id = %track_id, "autoplay continued");
                }
                TickOutcome::Stopped(reason) => {
                    info!(reason = ?reason, "autoplay monitor stopped");
                    break;
                }
            }
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        if !self.session.has_engine().await {
            return TickOutcome::Stopped(StopReason::NoSession);
        }
        let state = self.session.get_state().await;
        if !state.is_end_of_track() {
            return TickOutcome::Waiting;
        }

        let mut selection = match persist::read::<UserSelection>(
            self.storage.as_ref(),
            persist::USER_SELECTIONS,
        )
        .await
        {
            Ok(selection) => selection.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "could not read autoplay preference");
                UserSelection::default()
            }
        };
        if !selection.autoplay_enabled {
            if !self.session.clear_after(&state).await {
                return TickOutcome::Waiting;
            }
            return TickOutcome::Stopped(StopReason::AutoplayDisabled);
        }

        let (Some(source_id), Some(track_id)) = (state.source_id.clone(), state.track_id.clone())
        else {
            return TickOutcome::Stopped(StopReason::NoSession);
        };
        let Some(next) = next_track_id(&track_id, self.max_track_id) else {
            warn!(track_id = %track_id, "track id is outside the autoplay range");
            return TickOutcome::Stopped(StopReason::NoNextTrack);
        };

        let url = match self.resolver.resolve_audio_url(&source_id, &next).await {
            Ok(url) => url,
            Err(err) => {
                let err = CoordinatorError::Resolution(format!("{err:#}"));
                warn!(source_id = %source_id, track_id = %next, error = %err, "autoplay could not resolve next track");
                return TickOutcome::Stopped(StopReason::Failed(err));
            }
        };
        match self
            .session
            .play_after(&state, url.as_str(), &next, &source_id)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => return TickOutcome::Waiting,
            Err(err) => {
                warn!(track_id = %next, error = %err, "autoplay could not start next track");
                return TickOutcome::Stopped(StopReason::Failed(err));
            }
        }

        self.advanced.fetch_add(1, Ordering::Relaxed);
        selection.source_id = Some(source_id);
        selection.track_id = Some(next.clone());
        if let Err(err) =
            persist::write(self.storage.as_ref(), persist::USER_SELECTIONS, &selection).await
        {
            warn!(error = %err, "could not record autoplay selection");
        }
        info!(track_id = %next, "autoplay advanced to next track");
        TickOutcome::Advanced { track_id: next }
    }
}

impl Drop for AutoplayMonitor {
    fn drop(&mut self) {
        if let Ok(slot) = self.task.get_mut() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}
