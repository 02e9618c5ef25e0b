use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[async_trait]
pub trait AlarmHost: Send + Sync {
    async fn create(&self, name: &str, period: Duration) -> Result<()>;
    async fn clear(&self, name: &str) -> Result<bool>;
}

pub struct TokioAlarmHost {
    alarms: Mutex<HashMap<String, JoinHandle<()>>>,
    tx: mpsc::UnboundedSender<String>,
}

impl TokioAlarmHost {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                alarms: Mutex::new(HashMap::new()),
                tx,
            },
            rx,
        )
    }

    pub fn active(&self) -> usize {
        self.alarms
            .lock()
            .map(|alarms| alarms.values().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl AlarmHost for TokioAlarmHost {
    async fn create(&self, name: &str, period: Duration) -> Result<()> {
        let tx = self.tx.clone();
        let alarm_name = name.to_string();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(alarm_name.clone()).is_err() {
                    break;
                }
            }
        });

        let mut alarms = self
            .alarms
            .lock()
            .map_err(|_| anyhow::anyhow!("alarm table poisoned"))?;
        if let Some(previous) = alarms.insert(name.to_string(), task) {
            previous.abort();
        }
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<bool> {
        let mut alarms = self
            .alarms
            .lock()
            .map_err(|_| anyhow::anyhow!("alarm table poisoned"))?;
        match alarms.remove(name) {
            Some(task) => {
                task.abort();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Drop for TokioAlarmHost {
    fn drop(&mut self) {
        if let Ok(alarms) = self.alarms.get_mut() {
            for (_, task) in alarms.drain() {
                task.abort();
            }
        }
    }
}
