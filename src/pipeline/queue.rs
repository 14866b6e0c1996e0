//! Stage-to-stage queue: unbounded, closeable, multi-writer.
//!
//! The queue closes once every `QueueSender` clone is dropped; the receiver
//! then drains what is buffered and returns `None`.

use tokio::sync::mpsc;

use super::types::Item;

/// Create a connected sender/receiver pair.
pub fn queue() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

/// Producer side of a queue. Clone it to fan in from several tasks.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<Item>,
}

impl QueueSender {
    /// Push an item. Returns `false` if the consumer is gone.
    pub fn send(&self, item: impl Into<Item>) -> bool {
        self.tx.send(item.into()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of a queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Item>,
}

impl QueueReceiver {
    /// Next item, or `None` at end of stream.
    pub async fn recv(&mut self) -> Option<Item> {
        self.rx.recv().await
    }

    /// Collect everything until end of stream.
    pub async fn drain(mut self) -> Vec<Item> {
        let mut items = Vec::new();
        while let Some(item) = self.rx.recv().await {
            items.push(item);
        }
        items
    }
}
