use noor_bridge_core::{DhikrEntry, LoadReason};
use noor_bridge_engine::Origin;
use noor_bridge_host::{AudioEvent, WindowSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Frame {
    Hello {
        origin: Origin,
    },
    Command {
        id: u64,
        command: Value,
    },
    Response {
        id: u64,
        response: Value,
    },
    Notification {
        title: String,
        entry: DhikrEntry,
    },
    OpenWindow {
        window: WindowSpec,
    },
    Audio {
        id: u64,
        op: AudioOp,
    },
    AudioReply(AudioReply),
    AudioEvent {
        event: AudioEvent,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum AudioOp {
    Load { url: String },
    Play,
    Pause,
    Seek { time_seconds: f64 },
    Position,
    Unload,
}

impl AudioOp {
    pub fn name(&self) -> &'static str {
        match self {
            AudioOp::Load { .. } => "load",
            AudioOp::Play => "play",
            AudioOp::Pause => "pause",
            AudioOp::Seek { .. } => "seek",
            AudioOp::Position => "position",
            AudioOp::Unload => "unload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<LoadReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_seconds: Option<f64>,
}

impl Frame {
    pub fn parse(text: &str) -> serde_json::Result<Frame> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
