use crate::coordinator::Coordinator;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ledger::PendingOperationLedger;
use crate::protocol::{Command, Origin, Response};
use futures_util::FutureExt;
use noor_bridge_core::UserSelection;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub struct MessageRouter {
    coordinator: Arc<Coordinator>,
    ledger: PendingOperationLedger,
}

impl MessageRouter {
    pub fn new(coordinator: Arc<Coordinator>, cooldown: Duration) -> Self {
        Self {
            coordinator,
            ledger: PendingOperationLedger::new(cooldown),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub async fn handle(&self, message: &Value, origin: Origin) -> Option<Response> {
        if origin.is_self_originated() {
            debug!(action = ?message.get("action"), "ignoring self-originated message");
            return None;
        }
        Some(self.handle_ui(message).await)
    }

    async fn handle_ui(&self, message: &Value) -> Response {
        let command = match Command::parse(message) {
            Ok(command) => command,
            Err(err) => {
                debug!(error = %err, "rejected message");
                return Response::failure(&err);
            }
        };
        let action = command.action();
        let deduplicated = command.is_deduplicated();
        if deduplicated {
            if let Err(err) = self.ledger.try_begin(action, Instant::now()) {
                debug!(action, "duplicate request rejected");
                return Response::failure(&err);
            }
        }

        let outcome = AssertUnwindSafe(self.dispatch(command)).catch_unwind().await;
        if deduplicated {
            self.ledger.complete(action, Instant::now());
        }

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(action, kind = err.kind(), error = %err, "action failed");
                Response::failure(&err)
            }
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                error!(action, panic = %detail, "action handler panicked");
                Response::failure(&CoordinatorError::Internal(detail))
            }
        }
    }

    async fn dispatch(&self, command: Command) -> CoordinatorResult<Response> {
        let coordinator = &self.coordinator;
        let session = coordinator.session();
        let scheduler = coordinator.scheduler();

        let response = match command {
            Command::Ping => Response::message("pong"),
            Command::Play {
                url,
                track_id,
                source_id,
            } => Response::state(&coordinator.play(&url, &track_id, &source_id).await?)?,
            Command::Pause => Response::state(&session.pause().await?)?,
            Command::Resume => {
                let state = session.resume().await?;
                coordinator.autoplay().start();
                Response::state(&state)?
            }
            Command::Seek { time_seconds } => Response::state(&session.seek(time_seconds).await?)?,
            Command::GetState => with_persist_failures(
                Response::state(&session.get_state().await)?,
                session.persist_failures(),
            )?,
            Command::StartReminders {
                interval_seconds,
                mode,
            } => {
                scheduler.start(interval_seconds, mode).await?;
                Response::message(format!(
                    "Reminders started every {interval_seconds} seconds"
                ))
                .with("settings", scheduler.status().await.settings)?
            }
            Command::StopReminders => {
                scheduler.stop().await;
                Response::message("Reminders stopped")
            }
            Command::UpdateReminderInterval { interval_seconds } => {
                if scheduler.update_interval(interval_seconds).await? {
                    Response::message(format!(
                        "Reminder interval updated to {interval_seconds} seconds"
                    ))
                } else {
                    Response::message("Reminders are not running; interval unchanged")
                }
            }
            Command::UpdateReminderMode { mode } => {
                scheduler.update_mode(mode).await?;
                Response::message(format!("Reminder mode set to {mode}"))
            }
            Command::GetReminderSettings => {
                let status = scheduler.status().await;
                with_persist_failures(
                    Response::ok()
                        .with("settings", status.settings)?
                        .with("armed", status.armed)?,
                    scheduler.persist_failures(),
                )?
            }
            Command::UpdateSelection {
                source_id,
                track_id,
                autoplay_enabled,
            } => {
                let selection = UserSelection {
                    source_id,
                    track_id,
                    autoplay_enabled,
                };
                coordinator.save_selection(&selection).await?;
                Response::ok().with("selection", &selection)?
            }
        };
        Ok(response)
    }
}

// Reads carry the count of writes that never reached storage.
fn with_persist_failures(response: Response, failures: u64) -> CoordinatorResult<Response> {
    if failures == 0 {
        Ok(response)
    } else {
        response.with("persistFailures", failures)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
