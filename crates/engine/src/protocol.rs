use crate::error::{CoordinatorError, CoordinatorResult};
use noor_bridge_core::{validate_interval, MediaSessionState, ReminderMode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const ACTIONS: &[&str] = &[
    "ping",
    "play",
    "pause",
    "resume",
    "seek",
    "getState",
    "startReminders",
    "stopReminders",
    "updateReminderInterval",
    "updateReminderMode",
    "getReminderSettings",
    "updateSelection",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    Ui,
    AudioContext,
}

impl Origin {
    pub fn is_self_originated(self) -> bool {
        matches!(self, Origin::AudioContext)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    Ping,
    Play {
        url: String,
        #[serde(deserialize_with = "de_id")]
        track_id: String,
        #[serde(deserialize_with = "de_id")]
        source_id: String,
    },
    Pause,
    Resume,
    Seek {
        time_seconds: f64,
    },
    GetState,
    StartReminders {
        interval_seconds: i64,
        #[serde(default)]
        mode: ReminderMode,
    },
    StopReminders,
    UpdateReminderInterval {
        interval_seconds: i64,
    },
    UpdateReminderMode {
        mode: ReminderMode,
    },
    GetReminderSettings,
    UpdateSelection {
        #[serde(default, deserialize_with = "de_opt_id")]
        source_id: Option<String>,
        #[serde(default, deserialize_with = "de_opt_id")]
        track_id: Option<String>,
        #[serde(default)]
        autoplay_enabled: bool,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

impl Command {
    pub fn parse(value: &Value) -> CoordinatorResult<Command> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| CoordinatorError::InvalidInput("message has no action".to_string()))?;
        if !ACTIONS.contains(&action) {
            return Err(CoordinatorError::UnknownAction(action.to_string()));
        }

        let command: Command = serde_json::from_value(value.clone())
            .map_err(|err| CoordinatorError::InvalidInput(format!("{action}: {err}")))?;
        command.validate()?;
        Ok(command)
    }

    fn validate(&self) -> CoordinatorResult<()> {
        match self {
            Command::StartReminders {
                interval_seconds, ..
            }
            | Command::UpdateReminderInterval { interval_seconds } => {
                validate_interval(*interval_seconds)?;
            }
            Command::Seek { time_seconds } if !time_seconds.is_finite() => {
                return Err(CoordinatorError::InvalidInput(
                    "seek time must be a finite number".to_string(),
                ));
            }
            Command::Play {
                url,
                track_id,
                source_id,
            } => {
                if url.trim().is_empty() {
                    return Err(CoordinatorError::InvalidInput("play needs a url".to_string()));
                }
                if track_id.trim().is_empty() || source_id.trim().is_empty() {
                    return Err(CoordinatorError::InvalidInput(
                        "play needs a trackId and a sourceId".to_string(),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn action(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Play { .. } => "play",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Seek { .. } => "seek",
            Command::GetState => "getState",
            Command::StartReminders { .. } => "startReminders",
            Command::StopReminders => "stopReminders",
            Command::UpdateReminderInterval { .. } => "updateReminderInterval",
            Command::UpdateReminderMode { .. } => "updateReminderMode",
            Command::GetReminderSettings => "getReminderSettings",
            Command::UpdateSelection { .. } => "updateSelection",
        }
    }

    pub fn is_deduplicated(&self) -> bool {
        !matches!(
            self,
            Command::Ping | Command::GetState | Command::GetReminderSettings
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: Map::new(),
        }
    }

    pub fn failure(err: &CoordinatorError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            data: Map::new(),
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        let mut response = Self::ok();
        response
            .data
            .insert("message".to_string(), Value::String(text.into()));
        response
    }

    pub fn state(state: &MediaSessionState) -> CoordinatorResult<Self> {
        Self::ok().with("state", state)
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> CoordinatorResult<Self> {
        let value = serde_json::to_value(value).map_err(|err| {
            CoordinatorError::Internal(format!("could not encode response field {key}: {err}"))
        })?;
        self.data.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "success": false, "error": "Internal error: unserializable response" })
        })
    }
}
