//! Push notifications for the active symbol.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::{LoadingState, Snapshot, Symbol};

/// A change pushed to a [`Subscriber`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Update {
    Snapshot(Arc<Snapshot>),
    State(LoadingState),
}

/// Receives snapshot and loading-state changes for the active symbol.
///
/// Called from scheduler tasks; implementations must not block.
pub trait Subscriber: Send + Sync {
    fn on_update(&self, symbol: &Symbol, update: Update);
}

/// Forwards every update into an unbounded Tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<(Symbol, Update)>,
}

impl ChannelSubscriber {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(Symbol, Update)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Subscriber for ChannelSubscriber {
    fn on_update(&self, symbol: &Symbol, update: Update) {
        // A closed receiver means nobody is listening anymore.
        let _ = self.sender.send((symbol.clone(), update));
    }
}
