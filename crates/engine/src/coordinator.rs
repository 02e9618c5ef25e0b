use crate::autoplay::AutoplayMonitor;
use crate::delivery::{DeliveryChain, FallbackWindow, PageNotification, PopupWindow, SystemNotification};
use crate::error::CoordinatorResult;
use crate::persist;
use crate::scheduler::{ReminderDispatcher, ReminderScheduler, SchedulerConfig};
use crate::session::{MediaSessionStore, SessionConfig};
use noor_bridge_core::{AppConfig, DhikrCatalog, MediaSessionState, UserSelection};
use noor_bridge_host::{
    AlarmHost, AudioHost, AudioUrlResolver, KeyValueStore, NotificationHost, PageNotifier,
    PermissionProbe, WindowHost,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub session: SessionConfig,
    pub scheduler: SchedulerConfig,
    pub dedup_cooldown: Duration,
    pub autoplay_poll: Duration,
    pub max_track_id: u32,
    pub notification_title: String,
    pub popup_path: String,
}

impl CoordinatorConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        let iv = &cfg.intervals;
        Self {
            session: SessionConfig {
                load_timeout: Duration::from_millis(iv.load_timeout_ms),
                position_persist_interval: Duration::from_millis(iv.position_persist_ms),
            },
            scheduler: SchedulerConfig {
                confirmation_delay: Duration::from_millis(iv.confirmation_delay_ms),
                coarse_threshold: Duration::from_secs(iv.coarse_alarm_threshold_secs),
                permission_timeout: Duration::from_millis(iv.permission_probe_timeout_ms),
            },
            dedup_cooldown: Duration::from_millis(iv.dedup_cooldown_ms),
            autoplay_poll: Duration::from_millis(iv.autoplay_poll_ms),
            max_track_id: cfg.max_track_id,
            notification_title: cfg.notifications.title.clone(),
            popup_path: cfg.notifications.popup_path.clone(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

pub struct HostServices {
    pub storage: Arc<dyn KeyValueStore>,
    pub audio: Arc<dyn AudioHost>,
    pub notifications: Arc<dyn NotificationHost>,
    pub permission: Option<PermissionProbe>,
    pub page: Arc<dyn PageNotifier>,
    pub windows: Arc<dyn WindowHost>,
    pub alarms: Arc<dyn AlarmHost>,
    pub resolver: Arc<dyn AudioUrlResolver>,
    pub catalog: DhikrCatalog,
}

pub struct Coordinator {
    session: Arc<MediaSessionStore>,
    scheduler: Arc<ReminderScheduler>,
    autoplay: Arc<AutoplayMonitor>,
    storage: Arc<dyn KeyValueStore>,
    cfg: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(hosts: HostServices, cfg: CoordinatorConfig) -> Arc<Self> {
        let title = cfg.notification_title.clone();
        let notification_chain = DeliveryChain::new(vec![
            Box::new(SystemNotification::new(hosts.notifications.clone(), title.clone())),
            Box::new(PageNotification::new(hosts.page, title.clone())),
            Box::new(FallbackWindow::new(
                hosts.windows.clone(),
                title.clone(),
                cfg.popup_path.clone(),
            )),
        ]);
        let popup_chain = DeliveryChain::new(vec![Box::new(PopupWindow::new(
            hosts.windows,
            hosts.storage.clone(),
            title,
            cfg.popup_path.clone(),
        ))]);
        let dispatcher = Arc::new(ReminderDispatcher::new(
            hosts.catalog,
            notification_chain,
            popup_chain,
        ));

        let probe = hosts
            .permission
            .unwrap_or_else(|| PermissionProbe::from_host(hosts.notifications));
        let scheduler = Arc::new(ReminderScheduler::new(
            dispatcher,
            hosts.alarms,
            probe,
            hosts.storage.clone(),
            cfg.scheduler.clone(),
        ));
        let session = MediaSessionStore::new(hosts.audio, hosts.storage.clone(), cfg.session.clone());
        let autoplay = AutoplayMonitor::new(
            session.clone(),
            hosts.resolver,
            hosts.storage.clone(),
            cfg.autoplay_poll,
            cfg.max_track_id,
        );

        Arc::new(Self {
            session,
            scheduler,
            autoplay,
            storage: hosts.storage,
            cfg,
        })
    }

    pub fn session(&self) -> &Arc<MediaSessionStore> {
        &self.session
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    pub fn autoplay(&self) -> &Arc<AutoplayMonitor> {
        &self.autoplay
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.cfg
    }

    pub async fn play(
        &self,
        url: &str,
        track_id: &str,
        source_id: &str,
    ) -> CoordinatorResult<MediaSessionState> {
        let state = self.session.play(url, track_id, source_id).await?;
        self.autoplay.start();
        Ok(state)
    }

    pub async fn selection(&self) -> CoordinatorResult<UserSelection> {
        Ok(persist::read(self.storage.as_ref(), persist::USER_SELECTIONS)
            .await?
            .unwrap_or_default())
    }

    pub async fn save_selection(&self, selection: &UserSelection) -> CoordinatorResult<()> {
        persist::write(self.storage.as_ref(), persist::USER_SELECTIONS, selection).await
    }

    pub fn spawn_alarm_listener(
        self: &Arc<Self>,
        mut alarms: mpsc::UnboundedReceiver<String>,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(name) = alarms.recv().await {
                debug!(alarm = %name, "alarm fired");
                coordinator.scheduler.on_alarm(&name).await;
            }
            warn!("alarm channel closed");
        })
    }

    pub async fn shutdown(&self) {
        self.autoplay.stop();
        self.scheduler.shutdown().await;
    }
}
