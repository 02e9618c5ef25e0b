use crate::persist;
use async_trait::async_trait;
use noor_bridge_core::DhikrEntry;
use noor_bridge_host::{
    KeyValueStore, NotificationHost, NotificationSpec, PageNotifier, WindowHost, WindowSpec,
};
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(&self, entry: &DhikrEntry) -> bool;
}

pub struct DeliveryChain {
    strategies: Vec<Box<dyn DeliveryStrategy>>,
}

impl DeliveryChain {
    pub fn new(strategies: Vec<Box<dyn DeliveryStrategy>>) -> Self {
        Self { strategies }
    }

    pub async fn deliver(&self, entry: &DhikrEntry) -> Option<&'static str> {
        for strategy in &self.strategies {
            if strategy.attempt(entry).await {
                debug!(strategy = strategy.name(), "dhikr delivered");
                return Some(strategy.name());
            }
            debug!(strategy = strategy.name(), "delivery strategy failed; trying next");
        }
        warn!(
            strategies = ?self.strategy_names(),
            "every delivery strategy failed; reminder dropped"
        );
        None
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

pub struct SystemNotification {
    host: Arc<dyn NotificationHost>,
    title: String,
}

impl SystemNotification {
    pub fn new(host: Arc<dyn NotificationHost>, title: impl Into<String>) -> Self {
        Self {
            host,
            title: title.into(),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for SystemNotification {
    fn name(&self) -> &'static str {
        "system-notification"
    }

    async fn attempt(&self, entry: &DhikrEntry) -> bool {
        let spec = NotificationSpec::for_entry(&self.title, entry);
        match self.host.create(&spec).await {
            Ok(id) => {
                debug!(host = self.host.name(), id = %id, "notification created");
                true
            }
            Err(err) => {
                warn!(host = self.host.name(), error = %err, "system notification failed");
                false
            }
        }
    }
}

pub struct PageNotification {
    notifier: Arc<dyn PageNotifier>,
    title: String,
}

impl PageNotification {
    pub fn new(notifier: Arc<dyn PageNotifier>, title: impl Into<String>) -> Self {
        Self {
            notifier,
            title: title.into(),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for PageNotification {
    fn name(&self) -> &'static str {
        "page-notification"
    }

    async fn attempt(&self, entry: &DhikrEntry) -> bool {
        let spec = NotificationSpec::for_entry(&self.title, entry);
        match self.notifier.notify(&spec, entry).await {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "page notification unavailable");
                false
            }
        }
    }
}

pub struct FallbackWindow {
    windows: Arc<dyn WindowHost>,
    title: String,
    path: String,
}

impl FallbackWindow {
    pub fn new(windows: Arc<dyn WindowHost>, title: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            windows,
            title: title.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for FallbackWindow {
    fn name(&self) -> &'static str {
        "fallback-window"
    }

    async fn attempt(&self, entry: &DhikrEntry) -> bool {
        let spec = WindowSpec {
            path: self.path.clone(),
            title: self.title.clone(),
            body: Some(entry.notification_body()),
            width: 360,
            height: 220,
        };
        match self.windows.open(&spec).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "fallback window failed");
                false
            }
        }
    }
}

pub struct PopupWindow {
    windows: Arc<dyn WindowHost>,
    storage: Arc<dyn KeyValueStore>,
    title: String,
    path: String,
}

impl PopupWindow {
    pub fn new(
        windows: Arc<dyn WindowHost>,
        storage: Arc<dyn KeyValueStore>,
        title: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            windows,
            storage,
            title: title.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for PopupWindow {
    fn name(&self) -> &'static str {
        "popup-window"
    }

    async fn attempt(&self, entry: &DhikrEntry) -> bool {
        if let Err(err) = persist::write(self.storage.as_ref(), persist::CURRENT_DHIKR, entry).await
        {
            warn!(error = %err, "could not store dhikr for popup");
            return false;
        }
        let spec = WindowSpec {
            path: self.path.clone(),
            title: self.title.clone(),
            body: None,
            width: 420,
            height: 320,
        };
        match self.windows.open(&spec).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "popup window failed");
                false
            }
        }
    }
}
