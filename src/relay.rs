//! Relay loop — channel stream in, intake machine, replies out.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::channels::{Channel, IncomingMessage, OutgoingResponse};
use crate::error::Error;
use crate::intake::IntakeMachine;

/// Drives one channel until it ends or the process is interrupted.
pub struct Relay {
    channel: Arc<dyn Channel>,
    intake: Arc<IntakeMachine>,
}

impl Relay {
    pub fn new(channel: Arc<dyn Channel>, intake: Arc<IntakeMachine>) -> Self {
        Self { channel, intake }
    }

    /// Run until Ctrl+C or the channel stream ends.
    pub async fn run(self) -> Result<(), Error> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Ctrl+C received, shutting down...");
        })
        .await
    }

    /// Run until `shutdown` resolves or the channel stream ends.
    ///
    /// Every user gets one worker task fed by an unbounded queue, so a
    /// user's messages are handled and answered strictly in arrival order
    /// while different users proceed concurrently. Queued turns are drained
    /// before the channel is shut down.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
        let mut messages = self.channel.start().await?;
        let mut queues: HashMap<String, mpsc::UnboundedSender<IncomingMessage>> = HashMap::new();
        let mut workers = JoinSet::new();
        tokio::pin!(shutdown);

        tracing::info!(channel = self.channel.name(), "Relay ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                msg = messages.next() => match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("Channel stream ended, shutting down...");
                        break;
                    }
                },
            };

            let message = match queues.get(&message.user_id) {
                Some(queue) => match queue.send(message) {
                    Ok(()) => continue,
                    // Worker died; start a fresh one below.
                    Err(mpsc::error::SendError(message)) => message,
                },
                None => message,
            };

            let (tx, rx) = mpsc::unbounded_channel();
            queues.insert(message.user_id.clone(), tx);
            workers.spawn(serve_user(
                Arc::clone(&self.channel),
                Arc::clone(&self.intake),
                message,
                rx,
            ));
        }

        // Closing the queues lets each worker finish what it already holds.
        drop(queues);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "User worker failed");
            }
        }

        tracing::info!("Relay shutting down...");
        self.channel.shutdown().await?;
        Ok(())
    }
}

/// Handle one user's messages one at a time until their queue closes.
async fn serve_user(
    channel: Arc<dyn Channel>,
    intake: Arc<IntakeMachine>,
    first: IncomingMessage,
    mut queue: mpsc::UnboundedReceiver<IncomingMessage>,
) {
    dispatch(channel.as_ref(), &intake, first).await;
    while let Some(message) = queue.recv().await {
        dispatch(channel.as_ref(), &intake, message).await;
    }
}

async fn dispatch(channel: &dyn Channel, intake: &IntakeMachine, message: IncomingMessage) {
    tracing::debug!(
        user_id = %message.user_id,
        update_id = ?message.metadata.get("update_id"),
        "Inbound message"
    );

    let reply = intake.handle(&message.user_id, &message.content).await;
    if reply.is_empty() {
        tracing::warn!(user_id = %message.user_id, "Empty reply, nothing sent");
        return;
    }

    if let Err(e) = channel
        .respond(&message, OutgoingResponse::text(reply))
        .await
    {
        tracing::error!(user_id = %message.user_id, error = %e, "Reply delivery failed");
    }
}
