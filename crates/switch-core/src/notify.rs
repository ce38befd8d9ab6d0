use crate::status::SwitchState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel is closed")]
    Closed,

    #[error("notification backlog is full")]
    Backlog,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound sink for switch transitions.
///
/// Implementations must not block the tick loop and must be callable from
/// several threads at once (the poll responder publishes too).
pub trait Notifier: Send + Sync {
    fn notify(&self, state: SwitchState) -> Result<(), NotifyError>;
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, state: SwitchState) -> Result<(), NotifyError> {
        (**self).notify(state)
    }
}

/// Notifier that drops every transition; used when reporting is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _state: SwitchState) -> Result<(), NotifyError> {
        Ok(())
    }
}
