//! Lifecycle state machine for channels.

use thiserror::Error;
use tracing::debug;

/// Discrete states a channel can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Constructed but never started.
    Idle,
    /// Accepting traffic.
    Running,
    /// Stopped; may be started again.
    Stopped,
}

impl ChannelState {
    /// Returns `true` while the channel accepts traffic.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Events that trigger lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Begin accepting traffic.
    Start,
    /// Stop accepting traffic and release pending requests.
    Stop,
}

/// Lifecycle state manager for one named channel.
#[derive(Debug, Clone)]
pub struct ChannelLifecycle {
    channel: String,
    state: ChannelState,
}

impl ChannelLifecycle {
    /// Constructs a lifecycle controller in the [`ChannelState::Idle`] state.
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            state: ChannelState::Idle,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// Applies a lifecycle event, returning the resulting state.
    ///
    /// `Stop` is accepted from every state, which makes stopping idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyRunning`] when `Start` is applied to a
    /// running channel.
    pub fn transition(&mut self, event: LifecycleEvent) -> LifecycleResult<ChannelState> {
        let next = match (self.state, event) {
            (ChannelState::Idle | ChannelState::Stopped, LifecycleEvent::Start) => {
                ChannelState::Running
            }
            (ChannelState::Running, LifecycleEvent::Start) => {
                return Err(LifecycleError::AlreadyRunning {
                    channel: self.channel.clone(),
                });
            }
            (_, LifecycleEvent::Stop) => ChannelState::Stopped,
        };

        if next != self.state {
            debug!(
                channel = %self.channel,
                from = ?self.state,
                to = ?next,
                ?event,
                "channel lifecycle transition"
            );
            self.state = next;
        }

        Ok(self.state)
    }
}

/// Errors emitted by the lifecycle controller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// `Start` was requested while the channel was already running.
    #[error("channel `{channel}` is already running")]
    AlreadyRunning {
        /// Name of the channel.
        channel: String,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_stop_flow() {
        let mut lifecycle = ChannelLifecycle::new("http");

        assert_eq!(lifecycle.state(), ChannelState::Idle);
        lifecycle.transition(LifecycleEvent::Start).unwrap();
        assert!(lifecycle.state().is_running());
        lifecycle.transition(LifecycleEvent::Stop).unwrap();
        assert_eq!(lifecycle.state(), ChannelState::Stopped);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut lifecycle = ChannelLifecycle::new("http");

        lifecycle.transition(LifecycleEvent::Stop).unwrap();
        lifecycle.transition(LifecycleEvent::Stop).unwrap();
        assert_eq!(lifecycle.state(), ChannelState::Stopped);
    }

    #[test]
    fn stopped_channel_can_restart() {
        let mut lifecycle = ChannelLifecycle::new("http");

        lifecycle.transition(LifecycleEvent::Start).unwrap();
        lifecycle.transition(LifecycleEvent::Stop).unwrap();
        assert_eq!(
            lifecycle.transition(LifecycleEvent::Start).unwrap(),
            ChannelState::Running
        );
    }

    #[test]
    fn double_start_errors() {
        let mut lifecycle = ChannelLifecycle::new("http");
        lifecycle.transition(LifecycleEvent::Start).unwrap();

        let err = lifecycle
            .transition(LifecycleEvent::Start)
            .expect_err("second start should fail");

        assert_eq!(
            err,
            LifecycleError::AlreadyRunning {
                channel: "http".into()
            }
        );
    }
}
