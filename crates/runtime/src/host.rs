//! In-process timers and internal messaging.
//!
//! Both feed one queue. A timer sleeps on its own task and then enqueues
//! itself; a message is enqueued right away. The queue owner pulls jobs
//! one at a time and routes them to actions, so continuations of one
//! invocation never run concurrently.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use steward_core::error::HostError;
use steward_core::host::{InternalMessage, Messaging, TimerRequest, Timers};
use tokio::sync::mpsc;
use tracing::debug;

const QUEUE_CAPACITY: usize = 64;

/// A unit of deferred work.
#[derive(Debug, Clone)]
pub enum Job {
    Timer(TimerRequest),
    Message(InternalMessage),
}

impl Job {
    /// The action this job is routed to.
    pub fn target(&self) -> &str {
        match self {
            Job::Timer(timer) => &timer.target,
            Job::Message(message) => &message.target,
        }
    }
}

/// The sending half: handed to actions as their `Timers` and `Messaging`.
pub struct LocalHost {
    tx: mpsc::Sender<Job>,
    outstanding: Arc<AtomicUsize>,
}

/// The receiving half, owned by whoever dispatches jobs.
pub struct JobQueue {
    rx: mpsc::Receiver<Job>,
    outstanding: Arc<AtomicUsize>,
}

/// Create a connected host and queue.
pub fn local_host() -> (LocalHost, JobQueue) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let outstanding = Arc::new(AtomicUsize::new(0));
    (
        LocalHost {
            tx,
            outstanding: outstanding.clone(),
        },
        JobQueue { rx, outstanding },
    )
}

impl LocalHost {
    /// Jobs scheduled but not yet taken from the queue.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Timers for LocalHost {
    async fn set_timer(&self, delay: Duration, request: TimerRequest) -> Result<(), HostError> {
        if self.tx.is_closed() {
            return Err(HostError::Timer("job queue closed".into()));
        }
        debug!(target_action = %request.target, delay_secs = delay.as_secs(), description = %request.description, "Timer set");

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let tx = self.tx.clone();
        let outstanding = self.outstanding.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(Job::Timer(request)).await.is_err() {
                outstanding.fetch_sub(1, Ordering::SeqCst);
                debug!("Job queue dropped before timer fired");
            }
        });
        Ok(())
    }
}

#[async_trait]
impl Messaging for LocalHost {
    async fn send(&self, message: InternalMessage) -> Result<(), HostError> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.tx.send(Job::Message(message)).await {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            return Err(HostError::Delivery(format!("job queue closed: {e}")));
        }
        Ok(())
    }
}

impl JobQueue {
    /// The next job, waiting for pending timers to fire. `None` once
    /// nothing is scheduled.
    pub async fn next(&mut self) -> Option<Job> {
        if self.outstanding.load(Ordering::SeqCst) == 0 {
            return None;
        }
        let job = self.rx.recv().await?;
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        Some(job)
    }
}
