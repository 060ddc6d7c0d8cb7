//! Run loop: reads every channel, keeps each user's messages in order.
//!
//! Each user gets a worker task fed by an unbounded queue. Different users
//! are handled concurrently; one user's messages are handled one at a time
//! in arrival order. Idle workers retire and are respawned on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::channels::{IncomingMessage, OutgoingResponse};
use crate::coach::handler::Coach;
use crate::error::Error;

/// Reply sent when a handler fails with an error it did not handle itself.
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred. Please try again later.";

/// Queue into a user's worker plus the turn lock every successive worker
/// for that user must hold while it runs.
struct WorkerHandle {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    turn: Arc<Mutex<()>>,
}

impl WorkerHandle {
    /// Neither accepting messages nor held by a running worker.
    fn is_finished(&self) -> bool {
        self.tx.is_closed() && Arc::strong_count(&self.turn) == 1
    }
}

pub struct Dispatcher {
    coach: Arc<Coach>,
    idle_timeout: Duration,
    workers: HashMap<String, WorkerHandle>,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(coach: Arc<Coach>, idle_timeout: Duration) -> Self {
        Self {
            coach,
            idle_timeout,
            workers: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Start all channels and process messages until a shutdown signal
    /// arrives or every channel stream ends. Queued messages are finished
    /// before returning.
    pub async fn run(mut self) -> Result<(), Error> {
        let channels = self.coach.channels().clone();
        let mut message_stream = channels.start_all().await?;

        for (name, e) in channels.health_check_all().await {
            tracing::warn!(channel = %name, "Health check failed: {e}");
        }

        tracing::info!("✅ FitCoach is running");

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("Shutdown signal received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => self.dispatch(m),
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            }

            while let Some(result) = self.tasks.try_join_next() {
                if let Err(e) = result {
                    tracing::error!("Worker task failed: {e}");
                }
            }
        }

        // Closing the queues lets every worker finish what it has and exit.
        self.workers.clear();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!("Worker task failed: {e}");
            }
        }

        channels.shutdown_all().await?;
        Ok(())
    }

    /// Hand a message to its sender's worker, spawning one if needed.
    fn dispatch(&mut self, msg: IncomingMessage) {
        tracing::info!("{}: {}", msg.sender_label(), msg.content);

        let user_id = msg.user_id.clone();
        let (msg, turn) = match self.workers.get(&user_id) {
            Some(handle) => match handle.tx.send(msg) {
                Ok(()) => return,
                // Worker retired; the replacement waits for it to finish draining.
                Err(mpsc::error::SendError(msg)) => (msg, handle.turn.clone()),
            },
            None => (msg, Arc::new(Mutex::new(()))),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(msg).is_err() {
            return;
        }
        self.tasks.spawn(worker(
            self.coach.clone(),
            user_id.clone(),
            rx,
            turn.clone(),
            self.idle_timeout,
        ));
        self.workers.insert(user_id, WorkerHandle { tx, turn });
        self.workers.retain(|_, handle| !handle.is_finished());
    }
}

async fn worker(
    coach: Arc<Coach>,
    user_id: String,
    mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
    turn: Arc<Mutex<()>>,
    idle_timeout: Duration,
) {
    let _turn = turn.lock().await;
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(msg)) => process(&coach, msg).await,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                // Messages that raced with the close are still ours.
                while let Ok(msg) = rx.try_recv() {
                    process(&coach, msg).await;
                }
                tracing::debug!(user = %user_id, "Worker retired after idle timeout");
                break;
            }
        }
    }
}

/// Run the handler; unexpected errors get logged and a generic reply.
async fn process(coach: &Coach, msg: IncomingMessage) {
    if let Err(e) = coach.handle_message(&msg).await {
        tracing::error!(user = %msg.user_id, "Error handling message: {e}");
        if let Err(e) = coach
            .channels()
            .respond(&msg, OutgoingResponse::text(UNEXPECTED_ERROR))
            .await
        {
            tracing::error!(user = %msg.user_id, "Failed to send error reply: {e}");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
