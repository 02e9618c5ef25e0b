pub mod audio;
pub mod autoplay;
pub mod coordinator;
pub mod delivery;
pub mod error;
pub mod ledger;
pub mod persist;
pub mod protocol;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod startup;

#[cfg(test)]
mod test_support;

pub use autoplay::{AutoplayMonitor, StopReason, TickOutcome};
pub use coordinator::{Coordinator, CoordinatorConfig, HostServices};
pub use delivery::{
    DeliveryChain, DeliveryStrategy, FallbackWindow, PageNotification, PopupWindow,
    SystemNotification,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use ledger::PendingOperationLedger;
pub use protocol::{Command, Origin, Response, ACTIONS};
pub use router::MessageRouter;
pub use scheduler::{
    ReminderDispatcher, ReminderScheduler, SchedulerConfig, SchedulerStatus, TimerKind, ALARM_NAME,
};
pub use session::{MediaSessionStore, SessionConfig};
pub use startup::{reconcile, StartupReport};
