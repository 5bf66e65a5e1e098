//! The outbound queue and its single posting worker.
//!
//! Every reply goes through [`Outbox::enqueue`]; exactly one [`OutboundWorker`] drains the
//! queue and posts one message at a time, so replies reach a channel in the order they were
//! queued and the platform never sees concurrent posts from us.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use super::with_deadline;
use crate::{
    base::types::{LoreError, OutboundMessage},
    service::chat::ChatClient,
};

/// Sending half of the outbound queue.
///
/// It is trivially cloneable; every pipeline holds one.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<OutboundMessage>,
}

impl Outbox {
    /// Create a bounded queue, returning the sender and the receiver for the worker.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a message for posting.  Waits for room when the queue is full.
    pub async fn enqueue(&self, channel_id: &str, text: String) -> Result<(), LoreError> {
        let message = OutboundMessage {
            channel_id: channel_id.to_string(),
            text,
        };

        self.tx.send(message).await.map_err(|_| LoreError::Transport(anyhow::anyhow!("Outbound worker has shut down")))
    }
}

/// The single consumer of the outbound queue.
pub struct OutboundWorker {
    rx: mpsc::Receiver<OutboundMessage>,
    chat: ChatClient,
    deadline: Duration,
}

impl OutboundWorker {
    /// Create the worker.  Each post gets at most `deadline` before it is abandoned.
    pub fn new(rx: mpsc::Receiver<OutboundMessage>, chat: ChatClient, deadline: Duration) -> Self {
        Self { rx, chat, deadline }
    }

    /// Post queued messages one by one until every sender is gone.
    ///
    /// A failed or timed-out post is logged and skipped.
    #[instrument(name = "OutboundWorker::run", skip_all)]
    pub async fn run(mut self) {
        info!("Outbound worker started.");

        while let Some(message) = self.rx.recv().await {
            let post = self.chat.post_message(&message.channel_id, &message.text);

            if let Err(err) = with_deadline("post", self.deadline, post, LoreError::Transport).await {
                error!("Failed to post to `{}`: {}", message.channel_id, err);
            }
        }

        info!("Outbound worker stopped.");
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn enqueue_waits_when_full() {
        let (outbox, mut rx) = Outbox::new(1);

        outbox.enqueue("C1", "first".to_string()).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), outbox.enqueue("C1", "second".to_string())).await;
        assert!(blocked.is_err());

        assert_eq!(rx.recv().await.unwrap().text, "first");
        tokio::time::timeout(Duration::from_secs(1), outbox.enqueue("C1", "third".to_string())).await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().text, "third");
    }

    #[tokio::test]
    async fn enqueue_fails_once_worker_is_gone() {
        let (outbox, rx) = Outbox::new(4);
        drop(rx);

        assert!(matches!(outbox.enqueue("C1", "lost".to_string()).await, Err(LoreError::Transport(_))));
    }
}
