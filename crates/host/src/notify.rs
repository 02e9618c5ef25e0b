use crate::permission::PermissionLevel;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use noor_bridge_core::DhikrEntry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSpec {
    pub title: String,
    pub message: String,
    pub context_message: Option<String>,
    pub require_interaction: bool,
}

impl NotificationSpec {
    pub fn for_entry(title: &str, entry: &DhikrEntry) -> Self {
        Self {
            title: title.to_string(),
            message: entry.notification_body(),
            context_message: Some(entry.reward_text.clone()),
            require_interaction: false,
        }
    }
}

#[async_trait]
pub trait NotificationHost: Send + Sync {
    fn name(&self) -> &'static str;
    async fn permission_level(&self) -> Result<PermissionLevel>;
    async fn create(&self, spec: &NotificationSpec) -> Result<String>;
}

#[async_trait]
pub trait PageNotifier: Send + Sync {
    async fn notify(&self, spec: &NotificationSpec, entry: &DhikrEntry) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WindowSpec {
    pub path: String,
    pub title: String,
    pub body: Option<String>,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait WindowHost: Send + Sync {
    async fn open(&self, spec: &WindowSpec) -> Result<()>;
}

pub struct CommandNotificationHost {
    program: String,
    args: Vec<String>,
    counter: AtomicU64,
}

impl CommandNotificationHost {
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            counter: AtomicU64::new(0),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl NotificationHost for CommandNotificationHost {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn permission_level(&self) -> Result<PermissionLevel> {
        Ok(PermissionLevel::Granted)
    }

    async fn create(&self, spec: &NotificationSpec) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&spec.title)
            .arg(&spec.message)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;

        if !output.status.success() {
            return Err(anyhow!(
                "{} failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(format!("dhikr-{n}"))
    }
}

#[derive(Default)]
pub struct LogNotificationHost {
    counter: AtomicU64,
}

impl LogNotificationHost {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationHost for LogNotificationHost {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn permission_level(&self) -> Result<PermissionLevel> {
        Ok(PermissionLevel::Granted)
    }

    async fn create(&self, spec: &NotificationSpec) -> Result<String> {
        info!(title = %spec.title, message = %spec.message, "notification");
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(format!("dhikr-{n}"))
    }
}

#[derive(Default)]
pub struct LogWindowHost;

#[async_trait]
impl WindowHost for LogWindowHost {
    async fn open(&self, spec: &WindowSpec) -> Result<()> {
        info!(
            path = %spec.path,
            title = %spec.title,
            body = spec.body.as_deref().unwrap_or(""),
            "window opened"
        );
        Ok(())
    }
}
