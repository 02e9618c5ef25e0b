pub mod alarms;
pub mod audio;
pub mod notify;
pub mod permission;
pub mod resolver;
pub mod storage;
pub mod virtual_audio;

pub use alarms::{AlarmHost, TokioAlarmHost};
pub use audio::{AudioEvent, AudioEventSink, AudioHandle, AudioHost, LoadFailure, TaggedAudioEvent};
pub use notify::{
    CommandNotificationHost, LogNotificationHost, LogWindowHost, NotificationHost,
    NotificationSpec, PageNotifier, WindowHost, WindowSpec,
};
pub use permission::{PermissionCallback, PermissionLevel, PermissionProbe};
pub use resolver::{AudioUrlResolver, TemplateResolver};
pub use storage::{load_json, save_json, JsonFileStore, KeyValueStore, MemoryStore};
pub use virtual_audio::VirtualAudioHost;
