//! Owns the registered channels and routes outbound traffic to them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use agent_primitives::OutboundMessage;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::MessageBus;
use crate::channel::Channel;

/// Starts channels, dispatches outbound messages, and stops everything on
/// shutdown.
///
/// Progress updates are delivered with [`Channel::send`] the first time and
/// with [`Channel::edit`] afterwards when the channel returned a message id.
/// A final reply clears the tracked id for its conversation.
pub struct ChannelManager {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    bus: Arc<MessageBus>,
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
    progress_ids: Mutex<HashMap<String, String>>,
}

impl ChannelManager {
    /// Creates a manager dispatching messages consumed from `bus`.
    #[must_use]
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus,
                channels: RwLock::new(HashMap::new()),
                progress_ids: Mutex::new(HashMap::new()),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Adds a channel, replacing any channel registered under the same name.
    pub fn register(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_owned();
        let previous = self
            .shared
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), channel);
        if previous.is_some() {
            warn!(channel = %name, "replaced previously registered channel");
        }
    }

    /// Returns the channel registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.shared.get(name)
    }

    /// Returns the registered channel names in sorted order.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Spawns every channel and the outbound dispatch loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_all(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        for channel in self.shared.snapshot() {
            info!(channel = %channel.name(), "starting channel");
            tasks.push(tokio::spawn(async move {
                if let Err(err) = channel.start().await {
                    error!(channel = %channel.name(), error = %err, "channel terminated");
                }
            }));
        }

        let shared = Arc::clone(&self.shared);
        tasks.push(tokio::spawn(async move {
            while let Some(message) = shared.bus.consume_outbound().await {
                shared.dispatch(message).await;
            }
            debug!("outbound dispatch loop finished");
        }));
    }

    /// Routes one outbound message to its channel.
    pub async fn dispatch(&self, message: OutboundMessage) {
        self.shared.dispatch(message).await;
    }

    /// Stops every channel, closes the bus, and waits for spawned tasks.
    pub async fn stop_all(&self) {
        for channel in self.shared.snapshot() {
            if let Err(err) = channel.stop().await {
                warn!(channel = %channel.name(), error = %err, "failed to stop channel");
            }
        }
        self.shared.bus.close();

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "channel task did not finish cleanly");
            }
        }
        info!("all channels stopped");
    }
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("channels", &self.channel_names())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn progress_ids(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.progress_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn dispatch(&self, message: OutboundMessage) {
        let Some(channel) = self.get(message.channel()) else {
            warn!(
                channel = %message.channel(),
                chat_id = %message.chat_id(),
                "no channel registered for outbound message"
            );
            return;
        };

        let key = format!("{}:{}", message.channel(), message.chat_id());

        if message.is_progress() {
            let tracked = self.progress_ids().get(&key).cloned();
            if let Some(message_id) = tracked {
                if let Err(err) = channel
                    .edit(message.chat_id(), &message_id, message.content())
                    .await
                {
                    warn!(session = %key, error = %err, "failed to edit progress message");
                }
                return;
            }
            match channel.send(&message).await {
                Ok(Some(message_id)) => {
                    self.progress_ids().insert(key, message_id);
                }
                Ok(None) => {}
                Err(err) => warn!(session = %key, error = %err, "failed to send progress"),
            }
            return;
        }

        self.progress_ids().remove(&key);
        if let Err(err) = channel.send(&message).await {
            warn!(session = %key, error = %err, "failed to send reply");
        }
    }
}
