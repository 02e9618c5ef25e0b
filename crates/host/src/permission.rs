use crate::notify::NotificationHost;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Granted,
    Denied,
    Default,
}

pub type PermissionCallback = Box<dyn FnOnce(PermissionLevel) + Send>;

type CallbackQuery = Arc<dyn Fn(PermissionCallback) + Send + Sync>;

#[derive(Clone)]
pub enum PermissionProbe {
    Host(Arc<dyn NotificationHost>),
    Callback(CallbackQuery),
    Fixed(PermissionLevel),
}

impl PermissionProbe {
    pub fn from_host(host: Arc<dyn NotificationHost>) -> Self {
        Self::Host(host)
    }

    pub fn from_callback<F>(query: F) -> Self
    where
        F: Fn(PermissionCallback) + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(query))
    }

    pub async fn query(&self, timeout: Duration) -> PermissionLevel {
        let result = match self {
            PermissionProbe::Fixed(level) => return *level,
            PermissionProbe::Host(host) => {
                match tokio::time::timeout(timeout, host.permission_level()).await {
                    Ok(res) => res,
                    Err(_) => Err(anyhow::anyhow!("permission query timed out")),
                }
            }
            PermissionProbe::Callback(query) => Self::via_callback(query, timeout).await,
        };

        match result {
            Ok(level) => level,
            Err(err) => {
                warn!(error = %err, "notification permission probe failed; treating as denied");
                PermissionLevel::Denied
            }
        }
    }

    pub async fn allows_notifications(&self, timeout: Duration) -> bool {
        self.query(timeout).await != PermissionLevel::Denied
    }

    async fn via_callback(query: &CallbackQuery, timeout: Duration) -> Result<PermissionLevel> {
        let (tx, rx) = oneshot::channel();
        query(Box::new(move |level| {
            let _ = tx.send(level);
        }));
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(level)) => Ok(level),
            Ok(Err(_)) => Err(anyhow::anyhow!("permission callback dropped without answering")),
            Err(_) => Err(anyhow::anyhow!("permission callback timed out")),
        }
    }
}
