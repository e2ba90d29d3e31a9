//! Registry events published after each committed mutation.

use serde::{Deserialize, Serialize};
use starnotary_types::{AccountId, Amount, StarId};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StarEvent {
    Created {
        star_id: StarId,
        owner: AccountId,
    },
    Listed {
        star_id: StarId,
        price: Amount,
    },
    Delisted {
        star_id: StarId,
    },
    Sold {
        star_id: StarId,
        seller: AccountId,
        buyer: AccountId,
        price: Amount,
    },
    Exchanged {
        first: StarId,
        second: StarId,
    },
    Transferred {
        star_id: StarId,
        from: AccountId,
        to: AccountId,
    },
}

/// Broadcast fan-out for [`StarEvent`]s.
#[derive(Debug)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<StarEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StarEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; returns how many received it.
    pub(crate) fn publish(&self, event: StarEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
