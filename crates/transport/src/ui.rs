use crate::frame::Frame;
use crate::server::ClientHub;
use anyhow::{bail, Result};
use async_trait::async_trait;
use noor_bridge_core::DhikrEntry;
use noor_bridge_host::{NotificationSpec, PageNotifier, WindowHost, WindowSpec};
use std::sync::Arc;
use tracing::debug;

pub struct UiNotifier {
    hub: Arc<ClientHub>,
}

impl UiNotifier {
    pub fn new(hub: Arc<ClientHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl PageNotifier for UiNotifier {
    async fn notify(&self, spec: &NotificationSpec, entry: &DhikrEntry) -> Result<()> {
        let delivered = self.hub.broadcast(&Frame::Notification {
            title: spec.title.clone(),
            entry: entry.clone(),
        });
        if delivered == 0 {
            bail!("no extension page is connected");
        }
        debug!(delivered, "page notification sent");
        Ok(())
    }
}

pub struct UiWindowHost {
    hub: Arc<ClientHub>,
}

impl UiWindowHost {
    pub fn new(hub: Arc<ClientHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl WindowHost for UiWindowHost {
    async fn open(&self, spec: &WindowSpec) -> Result<()> {
        let delivered = self.hub.broadcast(&Frame::OpenWindow {
            window: spec.clone(),
        });
        if delivered == 0 {
            bail!("no extension page is connected to open {}", spec.path);
        }
        Ok(())
    }
}
