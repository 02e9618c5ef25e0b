use crate::error::{CoordinatorError, CoordinatorResult};
use noor_bridge_host::{load_json, save_json, KeyValueStore};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const PLAYBACK_STATE: &str = "playbackState";
pub const REMINDER_SETTINGS: &str = "reminderSettings";
pub const USER_SELECTIONS: &str = "userSelections";
pub const CURRENT_DHIKR: &str = "currentDhikr";

pub async fn read<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> CoordinatorResult<Option<T>> {
    load_json(store, key)
        .await
        .map_err(|err| CoordinatorError::Internal(format!("reading {key}: {err:#}")))
}

pub async fn write<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> CoordinatorResult<()> {
    save_json(store, key, value)
        .await
        .map_err(|err| CoordinatorError::Internal(format!("writing {key}: {err:#}")))
}
