pub mod config;
pub mod dhikr;
pub mod model;
pub mod urls;

pub use config::{AppConfig, ConfigIntervals, NotificationConfig};
pub use dhikr::{DhikrCatalog, DhikrEntry};
pub use model::{
    next_track_id, now_millis, validate_interval, IntervalOutOfRange, LoadReason,
    MediaSessionState, ReminderMode, ReminderSettings, UserSelection,
};
