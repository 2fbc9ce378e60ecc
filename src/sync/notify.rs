//! Message passing abstractions for sending notifications to Tokio tasks and
//! awaiting their acknowledgement, which is how the server shuts down
//! gracefully. This is how it works:
//!
//! 1. The server creates a [`Notifier`].
//! 2. Every connection task and the health checker get a [`Subscription`].
//! 3. On shutdown the [`Notifier`] broadcasts [`Notification::Shutdown`].
//! 4. Tasks finish what they were doing and acknowledge, either explicitly
//!    or by dropping their [`Subscription`].
//!
//! Steps 1 to 3 need a [`broadcast`] channel, step 4 uses an [`mpsc`] channel
//! that only closes when every subscription is gone.

use tokio::sync::{broadcast, mpsc};

/// Message that can be sent as a notification to Tokio tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Notification {
    /// Stop processing new work and exit.
    Shutdown,
}

/// Notifier object that can send messages to its subscribers.
#[derive(Debug)]
pub(crate) struct Notifier {
    /// Sender half of the notifications channel.
    notification_sender: broadcast::Sender<Notification>,

    /// Receiver half of the acknowledgements channel.
    acknowledge_receiver: mpsc::Receiver<()>,

    /// Never used to send, only cloned into subscriptions.
    acknowledge_sender: mpsc::Sender<()>,
}

/// Handle owned by a task that wants to be notified.
#[derive(Debug)]
pub(crate) struct Subscription {
    notification_receiver: broadcast::Receiver<Notification>,
    acknowledge_sender: mpsc::Sender<()>,
}

impl Notifier {
    pub fn new() -> Self {
        let (notification_sender, _) = broadcast::channel(1);
        let (acknowledge_sender, acknowledge_receiver) = mpsc::channel(1);

        Self {
            notification_sender,
            acknowledge_receiver,
            acknowledge_sender,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            notification_receiver: self.notification_sender.subscribe(),
            acknowledge_sender: self.acknowledge_sender.clone(),
        }
    }

    /// Sends `notification` to every subscriber and returns how many of them
    /// are currently alive. Fails if there are none.
    pub fn send(
        &self,
        notification: Notification,
    ) -> Result<usize, broadcast::error::SendError<Notification>> {
        self.notification_sender.send(notification)
    }

    /// Waits until every subscription has acknowledged or has been dropped.
    pub async fn collect_acknowledgements(self) {
        let Self {
            notification_sender,
            mut acknowledge_receiver,
            acknowledge_sender,
        } = self;

        // The channel closes only when all senders are gone, including ours.
        drop(acknowledge_sender);

        while acknowledge_receiver.recv().await.is_some() {}

        drop(notification_sender);
    }
}

impl Subscription {
    /// Non-blocking check for a pending notification.
    pub fn receive_notification(&mut self) -> Option<Notification> {
        self.notification_receiver.try_recv().ok()
    }

    /// Resolves when a notification arrives. A closed channel means the
    /// [`Notifier`] is gone, which is treated as a shutdown as well.
    pub async fn notified(&mut self) -> Notification {
        match self.notification_receiver.recv().await {
            Ok(notification) => notification,
            Err(_) => Notification::Shutdown,
        }
    }

    /// Tells the [`Notifier`] that this task is done.
    pub async fn acknowledge_notification(self) {
        // Errors mean the notifier stopped waiting, nothing to report then.
        let _ = self.acknowledge_sender.send(()).await;
    }
}
