use crate::coordinator::Coordinator;
use crate::persist;
use noor_bridge_core::ReminderSettings;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub session_restored: bool,
    pub reminders_rearmed: bool,
}

pub async fn reconcile(coordinator: &Coordinator) -> StartupReport {
    let mut report = StartupReport::default();

    match coordinator.session().restore().await {
        Ok(Some(state)) => {
            info!(track_id = ?state.track_id, position = state.position_seconds, "playback session restored");
            report.session_restored = state.track_url.is_some();
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "could not restore playback session"),
    }

    let settings = match persist::read::<ReminderSettings>(
        coordinator.storage().as_ref(),
        persist::REMINDER_SETTINGS,
    )
    .await
    {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "could not read reminder settings");
            None
        }
    };
    let Some(settings) = settings else {
        return report;
    };

    let scheduler = coordinator.scheduler();
    scheduler.restore_settings(settings).await;
    if settings.enabled {
        match scheduler
            .start(i64::from(settings.interval_seconds), settings.mode)
            .await
        {
            Ok(()) => {
                info!(interval = settings.interval_seconds, mode = %settings.mode, "reminders re-armed");
                report.reminders_rearmed = true;
            }
            Err(err) => warn!(error = %err, "could not re-arm reminders"),
        }
    }
    report
}
