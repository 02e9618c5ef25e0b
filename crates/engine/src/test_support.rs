use crate::delivery::{DeliveryChain, FallbackWindow, PageNotification, PopupWindow, SystemNotification};
use crate::scheduler::ReminderDispatcher;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use noor_bridge_core::{DhikrCatalog, DhikrEntry};
use noor_bridge_host::{
    AudioEventSink, AudioHandle, AudioHost, AudioUrlResolver, KeyValueStore, LoadFailure,
    NotificationHost, NotificationSpec, PageNotifier, PermissionLevel, VirtualAudioHost,
    WindowHost, WindowSpec,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use url::Url;

pub struct RecordingNotifications {
    permission: Mutex<PermissionLevel>,
    failing: AtomicBool,
    created: AtomicUsize,
}

impl RecordingNotifications {
    pub fn new(permission: PermissionLevel) -> Self {
        Self {
            permission: Mutex::new(permission),
            failing: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        }
    }

    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn set_permission(&self, level: PermissionLevel) {
        *self.permission.lock().unwrap() = level;
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationHost for RecordingNotifications {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn permission_level(&self) -> Result<PermissionLevel> {
        Ok(*self.permission.lock().unwrap())
    }

    async fn create(&self, _spec: &NotificationSpec) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("notification service unavailable"));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("n{n}"))
    }
}

#[derive(Default)]
pub struct RecordingWindows {
    opened: Mutex<Vec<WindowSpec>>,
}

impl RecordingWindows {
    pub fn opened(&self) -> Vec<WindowSpec> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl WindowHost for RecordingWindows {
    async fn open(&self, spec: &WindowSpec) -> Result<()> {
        self.opened.lock().unwrap().push(spec.clone());
        Ok(())
    }
}

pub struct ClosedPage;

#[async_trait]
impl PageNotifier for ClosedPage {
    async fn notify(&self, _spec: &NotificationSpec, _entry: &DhikrEntry) -> Result<()> {
        Err(anyhow!("no page open"))
    }
}

pub fn dispatcher(
    notifications: Arc<RecordingNotifications>,
    storage: Arc<dyn KeyValueStore>,
) -> ReminderDispatcher {
    let windows = Arc::new(RecordingWindows::default());
    let notification_chain = DeliveryChain::new(vec![
        Box::new(SystemNotification::new(notifications, "Dhikr Reminder")),
        Box::new(PageNotification::new(Arc::new(ClosedPage), "Dhikr Reminder")),
        Box::new(FallbackWindow::new(windows.clone(), "Dhikr Reminder", "dhikr-popup.html")),
    ]);
    let popup_chain = DeliveryChain::new(vec![Box::new(PopupWindow::new(
        windows,
        storage,
        "Dhikr Reminder",
        "dhikr-popup.html",
    ))]);
    ReminderDispatcher::new(DhikrCatalog::builtin(), notification_chain, popup_chain)
}

#[derive(Default)]
pub struct CountingResolver {
    calls: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl CountingResolver {
    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioUrlResolver for CountingResolver {
    async fn resolve_audio_url(&self, source_id: &str, track_id: &str) -> Result<Url> {
        self.calls
            .lock()
            .unwrap()
            .push((source_id.to_string(), track_id.to_string()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("catalog has no audio for {source_id}/{track_id}"));
        }
        Ok(Url::parse(&format!(
            "https://cdn.example/{source_id}/{track_id}.mp3"
        ))?)
    }
}

pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, key: &str, _value: Value) -> Result<()> {
        Err(anyhow!("disk full while writing {key}"))
    }
}

#[derive(Clone)]
pub struct GatedAudio {
    host: VirtualAudioHost,
    gate: Arc<Semaphore>,
}

impl GatedAudio {
    pub fn new(host: VirtualAudioHost) -> Self {
        Self {
            host,
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl AudioHost for GatedAudio {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn load(
        &self,
        url: &Url,
        sink: AudioEventSink,
    ) -> Result<Box<dyn AudioHandle>, LoadFailure> {
        match self.gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(LoadFailure::unavailable("gate closed")),
        }
        self.host.load(url, sink).await
    }
}
