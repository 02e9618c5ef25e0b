use crate::delivery::DeliveryChain;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::persist;
use futures_util::FutureExt;
use noor_bridge_core::{validate_interval, DhikrCatalog, ReminderMode, ReminderSettings};
use noor_bridge_host::{AlarmHost, KeyValueStore, PermissionProbe};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const ALARM_NAME: &str = "dhikr-reminder";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub confirmation_delay: Duration,
    pub coarse_threshold: Duration,
    pub permission_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerKind {
    CoarseAlarm,
    FineTimer,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub armed: bool,
    pub timer: Option<TimerKind>,
    pub settings: ReminderSettings,
}

pub struct ReminderDispatcher {
    catalog: DhikrCatalog,
    notification_chain: DeliveryChain,
    popup_chain: DeliveryChain,
    fired: AtomicU64,
}

impl ReminderDispatcher {
    pub fn new(
        catalog: DhikrCatalog,
        notification_chain: DeliveryChain,
        popup_chain: DeliveryChain,
    ) -> Self {
        Self {
            catalog,
            notification_chain,
            popup_chain,
            fired: AtomicU64::new(0),
        }
    }

    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    pub async fn fire(&self, mode: ReminderMode) -> Option<&'static str> {
        let entry = self.catalog.pick_random();
        self.fired.fetch_add(1, Ordering::Relaxed);
        let chain = match mode {
            ReminderMode::Notification => &self.notification_chain,
            ReminderMode::Popup => &self.popup_chain,
        };
        chain.deliver(&entry).await
    }

    async fn fire_contained(&self, mode: ReminderMode) {
        let outcome = AssertUnwindSafe(self.fire(mode)).catch_unwind().await;
        match outcome {
            Ok(Some(strategy)) => debug!(strategy, %mode, "reminder delivered"),
            Ok(None) => {}
            Err(_) => error!(%mode, "reminder delivery panicked; scheduler stays armed"),
        }
    }
}

struct Armed {
    kind: TimerKind,
    fine_task: Option<JoinHandle<()>>,
    confirm_task: JoinHandle<()>,
}

struct SchedulerState {
    armed: Option<Armed>,
    settings: ReminderSettings,
}

pub struct ReminderScheduler {
    state: Mutex<SchedulerState>,
    mode_tx: watch::Sender<ReminderMode>,
    dispatcher: Arc<ReminderDispatcher>,
    alarms: Arc<dyn AlarmHost>,
    probe: PermissionProbe,
    storage: Arc<dyn KeyValueStore>,
    cfg: SchedulerConfig,
    persist_failures: AtomicU64,
}

impl ReminderScheduler {
    pub fn new(
        dispatcher: Arc<ReminderDispatcher>,
        alarms: Arc<dyn AlarmHost>,
        probe: PermissionProbe,
        storage: Arc<dyn KeyValueStore>,
        cfg: SchedulerConfig,
    ) -> Self {
        let settings = ReminderSettings::default();
        let (mode_tx, _) = watch::channel(settings.mode);
        Self {
            state: Mutex::new(SchedulerState {
                armed: None,
                settings,
            }),
            mode_tx,
            dispatcher,
            alarms,
            probe,
            storage,
            cfg,
            persist_failures: AtomicU64::new(0),
        }
    }

    pub fn dispatcher(&self) -> &Arc<ReminderDispatcher> {
        &self.dispatcher
    }

    pub async fn restore_settings(&self, settings: ReminderSettings) {
        let mut state = self.state.lock().await;
        state.settings = settings;
        self.mode_tx.send_replace(settings.mode);
    }

    pub async fn start(&self, interval_seconds: i64, mode: ReminderMode) -> CoordinatorResult<()> {
        let interval = validate_interval(interval_seconds)?;
        self.ensure_permission(mode).await?;

        let mut state = self.state.lock().await;
        self.disarm(&mut state).await;
        self.arm(&mut state, interval, mode).await?;
        self.save(&state.settings).await;
        Ok(())
    }

    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let was_armed = state.armed.is_some();
        self.disarm(&mut state).await;
        state.settings.enabled = false;
        self.save(&state.settings).await;
        if was_armed {
            info!("reminders stopped");
        }
    }

    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        self.disarm(&mut state).await;
    }

    pub async fn update_interval(&self, interval_seconds: i64) -> CoordinatorResult<bool> {
        let interval = validate_interval(interval_seconds)?;
        let mode = {
            let state = self.state.lock().await;
            if state.armed.is_none() {
                return Ok(false);
            }
            state.settings.mode
        };
        self.ensure_permission(mode).await?;

        let mut state = self.state.lock().await;
        if state.armed.is_none() {
            return Ok(false);
        }
        let mode = state.settings.mode;
        self.disarm(&mut state).await;
        self.arm(&mut state, interval, mode).await?;
        self.save(&state.settings).await;
        Ok(true)
    }

    pub async fn update_mode(&self, mode: ReminderMode) -> CoordinatorResult<()> {
        if self.is_armed().await {
            self.ensure_permission(mode).await?;
        }
        let mut state = self.state.lock().await;
        state.settings.mode = mode;
        self.mode_tx.send_replace(mode);
        self.save(&state.settings).await;
        Ok(())
    }

    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    pub async fn is_armed(&self) -> bool {
        self.state.lock().await.armed.is_some()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state.lock().await;
        SchedulerStatus {
            armed: state.armed.is_some(),
            timer: state.armed.as_ref().map(|a| a.kind),
            settings: state.settings,
        }
    }

    pub async fn on_alarm(&self, name: &str) {
        if name != ALARM_NAME {
            return;
        }
        let armed_coarse = {
            let state = self.state.lock().await;
            matches!(
                state.armed.as_ref().map(|a| a.kind),
                Some(TimerKind::CoarseAlarm)
            )
        };
        if !armed_coarse {
            debug!("ignoring stale reminder alarm");
            return;
        }
        let mode = *self.mode_tx.borrow();
        self.dispatcher.fire_contained(mode).await;
    }

    async fn ensure_permission(&self, mode: ReminderMode) -> CoordinatorResult<()> {
        if mode == ReminderMode::Notification
            && !self
                .probe
                .allows_notifications(self.cfg.permission_timeout)
                .await
        {
            warn!("notification permission denied; reminders not armed");
            return Err(CoordinatorError::PermissionDenied);
        }
        Ok(())
    }

    async fn arm(
        &self,
        state: &mut SchedulerState,
        interval: u32,
        mode: ReminderMode,
    ) -> CoordinatorResult<()> {
        let period = Duration::from_secs(u64::from(interval));
        self.mode_tx.send_replace(mode);

        let (kind, fine_task) = if period >= self.cfg.coarse_threshold {
            self.alarms
                .create(ALARM_NAME, period)
                .await
                .map_err(|err| CoordinatorError::Internal(format!("creating alarm: {err:#}")))?;
            (TimerKind::CoarseAlarm, None)
        } else {
            (TimerKind::FineTimer, Some(self.spawn_fine_timer(period)))
        };

        let confirm_task = self.spawn_confirmation();
        state.armed = Some(Armed {
            kind,
            fine_task,
            confirm_task,
        });
        state.settings = ReminderSettings {
            enabled: true,
            interval_seconds: interval,
            mode,
        };
        info!(interval, %mode, timer = ?kind, "reminders armed");
        Ok(())
    }

    async fn disarm(&self, state: &mut SchedulerState) {
        if let Err(err) = self.alarms.clear(ALARM_NAME).await {
            warn!(error = %err, "failed to clear reminder alarm");
        }
        if let Some(armed) = state.armed.take() {
            if let Some(task) = armed.fine_task {
                task.abort();
            }
            armed.confirm_task.abort();
        }
    }

    fn spawn_fine_timer(&self, period: Duration) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let mode_rx = self.mode_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let mode = *mode_rx.borrow();
                dispatcher.fire_contained(mode).await;
            }
        })
    }

    fn spawn_confirmation(&self) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let mode_rx = self.mode_tx.subscribe();
        let delay = self.cfg.confirmation_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mode = *mode_rx.borrow();
            dispatcher.fire_contained(mode).await;
        })
    }

    async fn save(&self, settings: &ReminderSettings) {
        if let Err(err) =
            persist::write(self.storage.as_ref(), persist::REMINDER_SETTINGS, settings).await
        {
            let failures = self.persist_failures.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(error = %err, failures, "failed to persist reminder settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReminderScheduler, SchedulerConfig, TimerKind, ALARM_NAME};
    use crate::error::CoordinatorError;
    use crate::persist;
    use crate::test_support::{dispatcher, RecordingNotifications};
    use noor_bridge_core::{ReminderMode, ReminderSettings};
    use noor_bridge_host::{MemoryStore, PermissionLevel, PermissionProbe, TokioAlarmHost};
    use std::sync::Arc;
    use std::time::Duration;

    struct Rig {
        scheduler: Arc<ReminderScheduler>,
        notifications: Arc<RecordingNotifications>,
        alarms: Arc<TokioAlarmHost>,
        storage: Arc<MemoryStore>,
    }

    fn rig(permission: PermissionLevel) -> Rig {
        let notifications = Arc::new(RecordingNotifications::new(permission));
        let storage = Arc::new(MemoryStore::new());
        let (alarms, mut fired) = TokioAlarmHost::new();
        let alarms = Arc::new(alarms);
        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::new(dispatcher(notifications.clone(), storage.clone())),
            alarms.clone(),
            PermissionProbe::from_host(notifications.clone()),
            storage.clone(),
            SchedulerConfig {
                confirmation_delay: Duration::from_secs(3),
                coarse_threshold: Duration::from_secs(60),
                permission_timeout: Duration::from_secs(2),
            },
        ));
        let listener = scheduler.clone();
        tokio::spawn(async move {
            while let Some(name) = fired.recv().await {
                listener.on_alarm(&name).await;
            }
        });
        Rig {
            scheduler,
            notifications,
            alarms,
            storage,
        }
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let rig = rig(PermissionLevel::Granted);
        rig.scheduler.stop().await;
        rig.scheduler.stop().await;
        assert!(!rig.scheduler.is_armed().await);

        rig.scheduler.start(30, ReminderMode::Notification).await.unwrap();
        rig.scheduler.stop().await;
        rig.scheduler.stop().await;
        assert!(!rig.scheduler.is_armed().await);
    }

    #[tokio::test(start_paused = true)]
    async fn fine_timer_confirms_then_repeats() {
        let rig = rig(PermissionLevel::Granted);
        rig.scheduler.start(20, ReminderMode::Notification).await.unwrap();
        assert_eq!(rig.scheduler.status().await.timer, Some(TimerKind::FineTimer));

        sleep_secs(4).await;
        assert_eq!(rig.notifications.created(), 1, "confirmation firing");
        sleep_secs(17).await;
        assert_eq!(rig.notifications.created(), 2);
        sleep_secs(20).await;
        assert_eq!(rig.notifications.created(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn long_intervals_use_the_coarse_alarm() {
        let rig = rig(PermissionLevel::Granted);
        rig.scheduler.start(120, ReminderMode::Notification).await.unwrap();
        assert_eq!(
            rig.scheduler.status().await.timer,
            Some(TimerKind::CoarseAlarm)
        );
        assert_eq!(rig.alarms.active(), 1);

        sleep_secs(121).await;
        assert_eq!(rig.notifications.created(), 2);

        rig.scheduler.stop().await;
        assert_eq!(rig.alarms.active(), 0);
        sleep_secs(600).await;
        assert_eq!(rig.notifications.created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_fine_timer() {
        let rig = rig(PermissionLevel::Granted);
        rig.scheduler.start(10, ReminderMode::Notification).await.unwrap();
        rig.scheduler.stop().await;
        sleep_secs(60).await;
        assert_eq!(rig.notifications.created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_rearms_with_new_parameters() {
        let rig = rig(PermissionLevel::Granted);
        rig.scheduler.start(10, ReminderMode::Notification).await.unwrap();
        rig.scheduler.start(600, ReminderMode::Popup).await.unwrap();

        let status = rig.scheduler.status().await;
        assert_eq!(status.timer, Some(TimerKind::CoarseAlarm));
        assert_eq!(status.settings.interval_seconds, 600);
        sleep_secs(30).await;
        // only the confirmation of the second arm, delivered as a popup
        assert_eq!(rig.notifications.created(), 0);
        assert_eq!(rig.scheduler.dispatcher().fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_permission_blocks_notification_mode_only() {
        let rig = rig(PermissionLevel::Denied);
        let err = rig
            .scheduler
            .start(30, ReminderMode::Notification)
            .await
            .unwrap_err();
        assert_eq!(err, CoordinatorError::PermissionDenied);
        assert!(!rig.scheduler.is_armed().await);

        rig.scheduler.start(30, ReminderMode::Popup).await.unwrap();
        assert!(rig.scheduler.is_armed().await);
        assert_eq!(
            rig.scheduler
                .update_mode(ReminderMode::Notification)
                .await
                .unwrap_err(),
            CoordinatorError::PermissionDenied
        );
        assert_eq!(rig.scheduler.status().await.settings.mode, ReminderMode::Popup);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_update_is_noop_when_idle() {
        let rig = rig(PermissionLevel::Granted);
        assert!(!rig.scheduler.update_interval(30).await.unwrap());
        assert!(!rig.scheduler.is_armed().await);
        assert!(rig.scheduler.update_interval(2).await.is_err());

        rig.scheduler.start(30, ReminderMode::Notification).await.unwrap();
        assert!(rig.scheduler.update_interval(90).await.unwrap());
        let status = rig.scheduler.status().await;
        assert_eq!(status.settings.interval_seconds, 90);
        assert_eq!(status.timer, Some(TimerKind::CoarseAlarm));
    }

    #[tokio::test(start_paused = true)]
    async fn refused_interval_update_keeps_the_running_arm() {
        let rig = rig(PermissionLevel::Granted);
        rig.scheduler.start(120, ReminderMode::Notification).await.unwrap();
        rig.notifications.set_permission(PermissionLevel::Denied);

        let err = rig.scheduler.update_interval(300).await.unwrap_err();
        assert_eq!(err, CoordinatorError::PermissionDenied);

        let expected = ReminderSettings {
            enabled: true,
            interval_seconds: 120,
            mode: ReminderMode::Notification,
        };
        let status = rig.scheduler.status().await;
        assert!(status.armed);
        assert_eq!(status.timer, Some(TimerKind::CoarseAlarm));
        assert_eq!(status.settings, expected);
        assert_eq!(rig.alarms.active(), 1);
        let saved: ReminderSettings = persist::read(rig.storage.as_ref(), persist::REMINDER_SETTINGS)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_notification_host_keeps_scheduler_armed() {
        let rig = rig(PermissionLevel::Granted);
        rig.notifications.fail_all();
        rig.scheduler.start(5, ReminderMode::Notification).await.unwrap();

        sleep_secs(16).await;
        assert!(rig.scheduler.is_armed().await);
        assert!(rig.scheduler.dispatcher().fired() >= 3);
        assert_eq!(rig.notifications.created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settings_are_persisted_on_start_and_stop() {
        let rig = rig(PermissionLevel::Granted);
        rig.scheduler.start(45, ReminderMode::Popup).await.unwrap();
        let saved: ReminderSettings = persist::read(rig.storage.as_ref(), persist::REMINDER_SETTINGS)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            saved,
            ReminderSettings {
                enabled: true,
                interval_seconds: 45,
                mode: ReminderMode::Popup
            }
        );

        rig.scheduler.stop().await;
        let saved: ReminderSettings = persist::read(rig.storage.as_ref(), persist::REMINDER_SETTINGS)
            .await
            .unwrap()
            .unwrap();
        assert!(!saved.enabled);
        assert_eq!(saved.interval_seconds, 45);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_alarm_name_is_ignored() {
        let rig = rig(PermissionLevel::Granted);
        rig.scheduler.on_alarm(ALARM_NAME).await;
        rig.scheduler.on_alarm("something-else").await;
        assert_eq!(rig.scheduler.dispatcher().fired(), 0);
    }
}
