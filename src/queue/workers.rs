// Queue worker: single owner of the session and the question FIFO.
// Commands arrive over a channel; at most one analysis call is held in
// `in_flight` at a time, so calls never overlap and replies are appended in
// dispatch order.

use crate::analysis::{AnalysisInvoker, Invocation};
use crate::models::{Message, MessageId, MessageIdSequence};
use crate::queue::jobs::{MessageQueue, PendingRequest, QueueState};
use crate::session::{Session, SessionAction, DATASET_LOADED_TEXT};
use crate::storage::{ProgressTracker, UploadError, UploadFile, UploadGateway, UploadProgress};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("no dataset uploaded yet")]
    NoDataset,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("chat session is closed")]
    Closed,
}

/// What observers see after every change.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub session: Session,
    pub queue_state: QueueState,
    pub pending: usize,
}

impl ChatSnapshot {
    pub fn is_idle(&self) -> bool {
        self.queue_state == QueueState::Idle && self.pending == 0
    }
}

enum Command {
    Enqueue {
        question: String,
        reply: oneshot::Sender<Result<MessageId, QueueError>>,
    },
    UploadFinished {
        session_id: Uuid,
        outcome: Result<String, UploadError>,
        applied: oneshot::Sender<bool>,
    },
    Reset {
        reply: oneshot::Sender<Uuid>,
    },
}

type InFlight = BoxFuture<'static, Invocation>;

pub struct QueueWorker {
    session: Session,
    queue: MessageQueue,
    ids: MessageIdSequence,
    invoker: AnalysisInvoker,
    in_flight: Option<InFlight>,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Arc<ChatSnapshot>>,
}

impl QueueWorker {
    /// Drains until every [`ChatHandle`] is dropped. A call still in flight
    /// at that point is dropped unapplied.
    pub async fn run(mut self) {
        info!(session_id = %self.session.id, "Chat queue worker started");

        loop {
            tokio::select! {
                invocation = next_settled(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.settle(invocation);
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        if self.in_flight.take().is_some() {
            info!("Discarding in-flight analysis call");
        }
        info!("Chat queue worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue { question, reply } => {
                let result = self.enqueue(&question);
                reply.send(result).ok();
            }
            Command::UploadFinished {
                session_id,
                outcome,
                applied,
            } => {
                applied.send(self.finish_upload(session_id, outcome)).ok();
            }
            Command::Reset { reply } => {
                self.reset();
                reply.send(self.session.id).ok();
            }
        }
    }

    fn enqueue(&mut self, question: &str) -> Result<MessageId, QueueError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueueError::EmptyQuestion);
        }
        if !self.session.has_dataset() {
            debug!("Question rejected: no dataset uploaded");
            return Err(QueueError::NoDataset);
        }

        let message = Message::user(self.ids.next_id(), question);
        let message_id = message.id;
        self.queue.push(PendingRequest {
            message: message.clone(),
        });
        self.apply(SessionAction::UserMessageAppended(message));
        info!(%message_id, pending = self.queue.len(), "Question enqueued");

        self.pump();
        Ok(message_id)
    }

    fn settle(&mut self, invocation: Invocation) {
        let Some(request) = self.queue.settle() else {
            return;
        };

        let answered = invocation.answered();
        let reply = Message::assistant(
            self.ids.next_id(),
            invocation.reply.content,
            invocation.reply.body,
        );
        info!(
            question_id = %request.message.id,
            reply_id = %reply.id,
            answered,
            "Analysis settled"
        );
        self.apply(SessionAction::AnalysisSettled { reply, answered });

        self.pump();
    }

    /// Returns false when the result belongs to a session that was reset.
    fn finish_upload(&mut self, session_id: Uuid, outcome: Result<String, UploadError>) -> bool {
        if session_id != self.session.id {
            warn!(%session_id, "Discarding upload result for a session that no longer exists");
            return false;
        }

        match outcome {
            Ok(storage_key) => {
                info!(storage_key = %storage_key, "Dataset ready");
                let greeting = Message::assistant_text(self.ids.next_id(), DATASET_LOADED_TEXT);
                self.apply(SessionAction::UploadSucceeded {
                    storage_key,
                    greeting,
                });
            }
            Err(err) => {
                warn!(error = ?err, "Dataset upload failed");
                self.apply(SessionAction::UploadFailed {
                    error: err.to_string(),
                });
            }
        }

        self.pump();
        true
    }

    fn reset(&mut self) {
        if self.in_flight.take().is_some() {
            info!("Abandoning in-flight analysis call");
        }
        self.queue.clear();
        self.apply(SessionAction::Reset);
        info!(session_id = %self.session.id, "Started new chat");

        self.publish();
    }

    /// Dispatches the next question if nothing is in flight, then publishes.
    fn pump(&mut self) {
        if self.in_flight.is_none() {
            self.dispatch_next();
        }
        self.publish();
    }

    fn dispatch_next(&mut self) {
        // The key is captured now; a later upload does not affect this call.
        let Some(storage_key) = self.session.storage_key.clone() else {
            return;
        };
        let Some(request) = self.queue.start_next() else {
            return;
        };
        let question = request.question().to_string();
        let question_id = request.message.id;

        info!(%question_id, storage_key = %storage_key, "Dispatching analysis call");
        let invoker = self.invoker.clone();
        self.in_flight = Some(async move { invoker.invoke(&storage_key, &question).await }.boxed());
        self.apply(SessionAction::AnalysisStarted);
    }

    fn apply(&mut self, action: SessionAction) {
        self.session = std::mem::take(&mut self.session).reduce(action);
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(ChatSnapshot {
            session: self.session.clone(),
            queue_state: self.queue.state(),
            pending: self.queue.len(),
        }));
    }
}

/// Clears the displayed progress when an upload settles or its caller goes away.
struct ClearProgressOnDrop(Arc<watch::Sender<ProgressTracker>>);

impl Drop for ClearProgressOnDrop {
    fn drop(&mut self) {
        self.0.send_modify(ProgressTracker::reset);
    }
}

async fn next_settled(in_flight: &mut Option<InFlight>) -> Invocation {
    match in_flight {
        Some(call) => call.await,
        None => std::future::pending().await,
    }
}

/// Cloneable front door to a running chat session.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<ChatSnapshot>>,
    progress: Arc<watch::Sender<ProgressTracker>>,
    gateway: Arc<dyn UploadGateway>,
}

impl ChatHandle {
    /// Builds a handle and the worker that serves it; the caller runs the worker.
    pub fn new(
        invoker: AnalysisInvoker,
        gateway: Arc<dyn UploadGateway>,
        capacity: usize,
    ) -> (Self, QueueWorker) {
        let (commands_tx, commands_rx) = mpsc::channel(capacity.max(1));
        let session = Session::new();
        let queue = MessageQueue::default();
        let (snapshots_tx, snapshots_rx) = watch::channel(Arc::new(ChatSnapshot {
            session: session.clone(),
            queue_state: queue.state(),
            pending: 0,
        }));
        let (progress_tx, _) = watch::channel(ProgressTracker::default());

        let worker = QueueWorker {
            session,
            queue,
            ids: MessageIdSequence::default(),
            invoker,
            in_flight: None,
            commands: commands_rx,
            snapshots: snapshots_tx,
        };
        let handle = Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
            progress: Arc::new(progress_tx),
            gateway,
        };
        (handle, worker)
    }

    pub fn spawn(invoker: AnalysisInvoker, gateway: Arc<dyn UploadGateway>, capacity: usize) -> Self {
        let (handle, worker) = Self::new(invoker, gateway, capacity);
        tokio::spawn(worker.run());
        handle
    }

    /// Appends the question to the conversation and queues it for analysis.
    pub async fn ask(&self, question: impl Into<String>) -> Result<MessageId, QueueError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Enqueue {
                question: question.into(),
                reply,
            })
            .await
            .map_err(|_| QueueError::Closed)?;
        response.await.map_err(|_| QueueError::Closed)?
    }

    /// Starts a new chat, abandoning queued and in-flight questions.
    pub async fn reset(&self) -> Result<Uuid, QueueError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Reset { reply })
            .await
            .map_err(|_| QueueError::Closed)?;
        response.await.map_err(|_| QueueError::Closed)
    }

    /// Uploads a dataset for the current session. The result is applied only
    /// if the session is still the same one when the upload settles; otherwise
    /// a successful transfer reports [`UploadError::SessionChanged`].
    pub async fn upload(&self, file: UploadFile) -> Result<String, UploadError> {
        let session_id = self.snapshots.borrow().session.id;
        info!(file = %file.name, bytes = file.size(), %session_id, "Upload started");

        self.progress.send_modify(ProgressTracker::reset);
        let clear_progress = ClearProgressOnDrop(Arc::clone(&self.progress));
        let progress = Arc::clone(&self.progress);
        let on_progress = move |tick: UploadProgress| {
            progress.send_if_modified(|tracker| {
                let changed = tracker.observe(tick);
                if changed {
                    debug!(percentage = tick.percentage, loaded = tick.loaded, total = tick.total, "Upload progress");
                }
                changed
            });
        };

        let outcome = self.gateway.upload(file, &on_progress).await;
        drop(clear_progress);

        let (applied_tx, applied_rx) = oneshot::channel();
        let closed = || UploadError::Unexpected("chat session is closed".to_string());
        self.commands
            .send(Command::UploadFinished {
                session_id,
                outcome: outcome.clone(),
                applied: applied_tx,
            })
            .await
            .map_err(|_| closed())?;
        let applied = applied_rx.await.map_err(|_| closed())?;

        match outcome {
            Ok(_) if !applied => Err(UploadError::SessionChanged),
            outcome => outcome,
        }
    }

    pub fn snapshot(&self) -> Arc<ChatSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ChatSnapshot>> {
        self.snapshots.clone()
    }

    pub fn upload_progress(&self) -> Option<UploadProgress> {
        self.progress.borrow().current()
    }

    pub fn watch_progress(&self) -> watch::Receiver<ProgressTracker> {
        self.progress.subscribe()
    }

    /// Resolves once nothing is queued or in flight.
    pub async fn wait_idle(&self) -> Result<Arc<ChatSnapshot>, QueueError> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| snapshot.is_idle())
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(snapshot.clone())
    }
}
