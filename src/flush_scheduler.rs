// src/flush_scheduler.rs - Coalesced background writes for the file backend
use std::sync::{Arc, Weak};

use log::{debug, error, info, trace};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::{storage::Shared, NotesError, Result};

#[derive(Debug, Clone)]
pub struct FlushSchedulerStatus {
    /// Whether the scheduler is running
    pub is_running: bool,
    /// Coalescing window in effect
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub enum FlushCommand {
    /// In-memory state changed and needs to reach disk
    MarkDirty,
    /// Flush whatever is pending and stop the scheduler
    Stop,
}

pub struct FlushScheduler {
    /// Coalescing window
    window: Duration,

    /// Channel to send commands to the scheduler task
    command_tx: mpsc::Sender<FlushCommand>,

    /// Handle to the scheduler task
    scheduler_task: Option<JoinHandle<()>>,

    /// Current status of the scheduler
    status: FlushSchedulerStatus,
}

impl FlushScheduler {
    /// Create a new, not yet started scheduler for the given window
    pub fn new(window: Duration) -> Self {
        info!("Initializing flush scheduler with window {:?}", window);
        let (command_tx, _) = mpsc::channel(16);

        Self {
            window,
            command_tx,
            scheduler_task: None,
            status: FlushSchedulerStatus {
                is_running: false,
                window,
            },
        }
    }

    /// Start the scheduler task. It holds only a weak reference to the store state
    /// and exits once the store is gone.
    pub(crate) fn start(&mut self, shared: Weak<Shared>) {
        if self.scheduler_task.is_some() {
            debug!("Flush scheduler already running");
            return;
        }

        let (command_tx, mut command_rx) = mpsc::channel(16);
        self.command_tx = command_tx;
        let window = self.window;

        let task = tokio::spawn(async move {
            loop {
                match command_rx.recv().await {
                    Some(FlushCommand::MarkDirty) => {
                        let deadline = time::sleep(window);
                        tokio::pin!(deadline);

                        // Everything that arrives inside the window rides on one write.
                        let mut stop = false;
                        loop {
                            tokio::select! {
                                _ = &mut deadline => break,
                                cmd = command_rx.recv() => match cmd {
                                    Some(FlushCommand::MarkDirty) => trace!("Coalescing dirty mark"),
                                    Some(FlushCommand::Stop) | None => {
                                        stop = true;
                                        break;
                                    }
                                }
                            }
                        }

                        if !flush_once(&shared).await || stop {
                            break;
                        }
                    }
                    Some(FlushCommand::Stop) | None => {
                        flush_once(&shared).await;
                        break;
                    }
                }
            }
            debug!("Flush scheduler task exiting");
        });

        self.scheduler_task = Some(task);
        self.status.is_running = true;
    }

    /// Signal that a mutation is waiting to be written. Never blocks; a full channel
    /// already guarantees a pending flush.
    pub fn mark_dirty(&self) {
        if let Err(mpsc::error::TrySendError::Closed(_)) =
            self.command_tx.try_send(FlushCommand::MarkDirty)
        {
            error!("Flush scheduler is not running; mutation will be written on close");
        }
    }

    /// Stop the scheduler if it's running, flushing pending state first
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.scheduler_task.take() {
            if let Err(e) = self.command_tx.send(FlushCommand::Stop).await {
                debug!("Flush scheduler already gone: {}", e);
            }

            if let Err(e) = task.await {
                let error_mgs = format!("Failed to stop flush scheduler: {}", e);
                error!("{}", error_mgs);
                return Err(NotesError::FlushFailed { message: error_mgs });
            }

            self.status.is_running = false;
            info!("Flush scheduler stopped");
        } else {
            debug!("Flush scheduler is not running");
        }

        Ok(())
    }

    /// Get the current status of the flush scheduler
    pub fn get_status(&self) -> FlushSchedulerStatus {
        self.status.clone()
    }
}

/// Writes the current state once. Returns false when the store has been dropped.
async fn flush_once(shared: &Weak<Shared>) -> bool {
    let Some(shared) = shared.upgrade() else {
        debug!("Store dropped, flush scheduler exiting");
        return false;
    };

    let worker = Arc::clone(&shared);
    match tokio::task::spawn_blocking(move || worker.flush()).await {
        Ok(Ok(())) => trace!("Background flush completed"),
        Ok(Err(e)) => error!("Background flush failed: {}", e),
        Err(e) => error!("Background flush task panicked: {}", e),
    }
    true
}
