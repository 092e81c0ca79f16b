// SPDX-License-Identifier: Apache-2.0

use flume::{Receiver, Sender};

/// Sending half of a bounded channel between OS threads
pub struct BoundedSender<T> {
    tx: Sender<T>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("channel disconnected")]
    Disconnected,
}

impl<T> BoundedSender<T> {
    /// Blocks until there is capacity in the channel.
    pub fn send(&self, item: T) -> Result<(), SendError> {
        self.tx.send(item).map_err(|_| SendError::Disconnected)
    }
}

/// Receiving half of a bounded channel between OS threads
pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    /// Blocks until an item is available. Returns None once every sender is
    /// gone and the channel is drained.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);
    (BoundedSender { tx }, BoundedReceiver { rx })
}
