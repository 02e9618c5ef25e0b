use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub const MIN_REMINDER_INTERVAL_SECS: i64 = 5;
pub const MAX_REMINDER_INTERVAL_SECS: i64 = 3_600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MediaSessionState {
    pub track_url: Option<String>,
    pub track_id: Option<String>,
    pub source_id: Option<String>,
    pub is_playing: bool,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub last_updated_at: u64,
}

impl MediaSessionState {
    pub fn started(url: String, track_id: String, source_id: String, duration: f64) -> Self {
        Self {
            track_url: Some(url),
            track_id: Some(track_id),
            source_id: Some(source_id),
            is_playing: true,
            position_seconds: 0.0,
            duration_seconds: sanitize_seconds(duration),
            last_updated_at: now_millis(),
        }
    }

    pub fn has_track(&self) -> bool {
        self.track_url.is_some()
    }

    pub fn is_end_of_track(&self) -> bool {
        !self.is_playing
            && self.duration_seconds > 0.0
            && self.position_seconds >= self.duration_seconds
    }

    pub fn clamp_position(&self, seconds: f64) -> f64 {
        let seconds = sanitize_seconds(seconds);
        if self.duration_seconds > 0.0 {
            seconds.min(self.duration_seconds)
        } else {
            seconds
        }
    }

    pub fn touch(&mut self) {
        self.last_updated_at = now_millis();
    }

    pub fn clear(&mut self) {
        *self = Self {
            last_updated_at: now_millis(),
            ..Self::default()
        };
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ReminderMode {
    #[default]
    Notification,
    Popup,
}

impl fmt::Display for ReminderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderMode::Notification => write!(f, "notification"),
            ReminderMode::Popup => write!(f, "popup"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSettings {
    pub enabled: bool,
    pub interval_seconds: u32,
    pub mode: ReminderMode,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 300,
            mode: ReminderMode::Notification,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalOutOfRange(pub i64);

impl fmt::Display for IntervalOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interval must be between {MIN_REMINDER_INTERVAL_SECS} and {MAX_REMINDER_INTERVAL_SECS} seconds, got {}",
            self.0
        )
    }
}

impl std::error::Error for IntervalOutOfRange {}

pub fn validate_interval(seconds: i64) -> Result<u32, IntervalOutOfRange> {
    if (MIN_REMINDER_INTERVAL_SECS..=MAX_REMINDER_INTERVAL_SECS).contains(&seconds) {
        Ok(seconds as u32)
    } else {
        Err(IntervalOutOfRange(seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserSelection {
    pub source_id: Option<String>,
    pub track_id: Option<String>,
    pub autoplay_enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoadReason {
    Network,
    Decode,
    UnsupportedFormat,
    BlockedByAutoplayPolicy,
    Unavailable,
}

impl fmt::Display for LoadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadReason::Network => "network",
            LoadReason::Decode => "decode",
            LoadReason::UnsupportedFormat => "unsupported-format",
            LoadReason::BlockedByAutoplayPolicy => "blocked-by-autoplay-policy",
            LoadReason::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

pub fn next_track_id(current: &str, max: u32) -> Option<String> {
    let n: u32 = current.trim().parse().ok()?;
    if n == 0 || n > max {
        return None;
    }
    let next = if n == max { 1 } else { n + 1 };
    Some(next.to_string())
}

pub fn sanitize_seconds(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
