use serde::{Deserialize, Serialize};

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigIntervals {
    pub dedup_cooldown_ms: u64,
    pub autoplay_poll_ms: u64,
    pub position_persist_ms: u64,
    pub load_timeout_ms: u64,
    pub confirmation_delay_ms: u64,
    pub coarse_alarm_threshold_secs: u64,
    pub permission_probe_timeout_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            dedup_cooldown_ms: 1_500,
            autoplay_poll_ms: 2_000,
            position_persist_ms: 5_000,
            load_timeout_ms: 15_000,
            confirmation_delay_ms: 3_000,
            coarse_alarm_threshold_secs: 60,
            permission_probe_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    pub command: Option<String>,
    pub popup_path: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "Dhikr Reminder".to_string(),
            command: None,
            popup_path: "dhikr-popup.html".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub listen_addr: String,
    pub storage_path: Option<String>,
    pub audio_backend: String,
    pub audio_url_template: String,
    pub max_track_id: u32,
    pub log_level: String,
    pub intervals: ConfigIntervals,
    pub notifications: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            listen_addr: "127.0.0.1:47821".to_string(),
            storage_path: None,
            audio_backend: "remote".to_string(),
            audio_url_template:
                "https://download.quranicaudio.com/quran/{source}/{track:03}.mp3".to_string(),
            max_track_id: 114,
            log_level: "info".to_string(),
            intervals: ConfigIntervals::default(),
            notifications: NotificationConfig::default(),
        }
    }
}
