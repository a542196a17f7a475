//! Concurrent multipart transfer engine.
//!
//! The engine drives one [`MultipartTarget`] through the session lifecycle:
//!
//! ```text
//! NotStarted -> SessionInitiated -> PartsDispatching
//!     -> AllPartsComplete -> Finalizing -> Completed
//!     -> AnyPartFailed -> Aborting -> Aborted
//! ```
//!
//! Undone parts are queued in part order on a bounded channel and consumed by
//! a pool of worker tasks, each performing one part operation at a time.
//! Results flow back to the driving task, which owns the session and its
//! checkpoint. The first failure cancels the pool; parts already in flight
//! run to completion but their results are ignored.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use oos_model::CompletedPart;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::checkpoint::{MultipartSession, SessionStore};
use super::part::{TransferPart, total_size};
use super::progress::{ProgressEvent, ProgressEventKind, ProgressListener};
use crate::error::{OosError, OosResult};

/// Largest accepted number of concurrent workers.
pub const MAX_ROUTINES: usize = 100;

/// The remote side of a multipart transfer.
#[async_trait]
pub trait MultipartTarget: Send + Sync + 'static {
    /// Open a session and return its id.
    async fn initiate(&self) -> OosResult<String>;

    /// Transfer one part.
    async fn transfer(&self, session_id: &str, part: TransferPart) -> OosResult<CompletedPart>;

    /// Finalize the session with every part result, sorted by part number.
    async fn complete(&self, session_id: &str, parts: Vec<CompletedPart>) -> OosResult<()>;

    /// Discard the session.
    async fn abort(&self, session_id: &str) -> OosResult<()>;
}

/// Hook run by a worker before each part operation.
///
/// Returning an error fails the part as if the operation had failed.
pub trait PartInterceptor: Send + Sync + fmt::Debug {
    /// Inspect a part about to be transferred.
    fn intercept(&self, _part: &TransferPart) -> OosResult<()> {
        Ok(())
    }
}

/// Interceptor that lets every part through.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInterceptor;

impl PartInterceptor for NoopInterceptor {}

/// Lifecycle stage of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Nothing happened yet.
    NotStarted,
    /// A remote session exists.
    SessionInitiated,
    /// Workers are transferring parts.
    PartsDispatching,
    /// Every part finished.
    AllPartsComplete,
    /// The completion call is in flight.
    Finalizing,
    /// The transfer succeeded.
    Completed,
    /// A part failed.
    AnyPartFailed,
    /// The abort call is in flight.
    Aborting,
    /// The transfer failed and was unwound.
    Aborted,
}

/// How a run begins.
#[derive(Debug)]
pub enum SessionStart {
    /// No remote session exists yet; the engine initiates one.
    Fresh(MultipartSession),
    /// Continue a session restored from a checkpoint.
    Resume(MultipartSession),
}

/// Drives a [`MultipartTarget`] with a bounded worker pool.
#[derive(Debug)]
pub struct TransferEngine<T> {
    target: Arc<T>,
    routines: usize,
    interceptor: Arc<dyn PartInterceptor>,
    listener: Option<Arc<dyn ProgressListener>>,
}

impl<T: MultipartTarget> TransferEngine<T> {
    /// An engine with `routines` workers, clamped to `1..=100`.
    pub fn new(target: T, routines: usize) -> Self {
        Self {
            target: Arc::new(target),
            routines: routines.clamp(1, MAX_ROUTINES),
            interceptor: Arc::new(NoopInterceptor),
            listener: None,
        }
    }

    /// Run `interceptor` before every part.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn PartInterceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }

    /// Report progress to `listener`.
    #[must_use]
    pub fn with_listener(mut self, listener: Option<Arc<dyn ProgressListener>>) -> Self {
        self.listener = listener;
        self
    }

    /// Number of workers.
    #[must_use]
    pub fn routines(&self) -> usize {
        self.routines
    }

    /// Run the transfer to completion or first failure.
    ///
    /// With a `store`, the session is saved after initiation and after every
    /// part, cleared on success, and left in place on failure so a later run
    /// can resume it; the remote session is then kept alive. Without a store
    /// a failure aborts the remote session.
    pub async fn run(
        &self,
        start: SessionStart,
        mut store: Option<&mut dyn SessionStore>,
    ) -> OosResult<MultipartSession> {
        let mut state = Tracker::new();
        let (mut session, resumed) = match start {
            SessionStart::Fresh(session) => (session, false),
            SessionStart::Resume(session) => (session, true),
        };

        let total = total_size(&session.parts);
        let mut consumed = session.completed_bytes();
        self.notify(ProgressEventKind::Started, consumed, total);

        if !resumed {
            session.session_id = match self.target.initiate().await {
                Ok(id) => id,
                Err(err) => {
                    self.notify(ProgressEventKind::Failed, consumed, total);
                    return Err(err);
                }
            };
            persist(&mut store, &session).await;
        }
        state.advance(TransferState::SessionInitiated);

        let todo = session.todo_parts();
        state.advance(TransferState::PartsDispatching);
        let failure = self.dispatch(&mut session, todo, &mut store, &mut consumed, total).await;

        if let Some(err) = failure {
            state.advance(TransferState::AnyPartFailed);
            self.unwind(&mut state, &session.session_id, store.is_some()).await;
            self.notify(ProgressEventKind::Failed, consumed, total);
            return Err(err);
        }
        state.advance(TransferState::AllPartsComplete);

        state.advance(TransferState::Finalizing);
        if let Err(err) = self
            .target
            .complete(&session.session_id, session.completed_parts())
            .await
        {
            self.unwind(&mut state, &session.session_id, store.is_some()).await;
            self.notify(ProgressEventKind::Failed, consumed, total);
            return Err(err);
        }

        if let Some(store) = store.as_mut() {
            if let Err(err) = store.clear().await {
                warn!(error = %err, "failed to remove checkpoint after completion");
            }
        }
        state.advance(TransferState::Completed);
        self.notify(ProgressEventKind::Completed, consumed, total);
        Ok(session)
    }

    /// Feed `todo` to the worker pool and collect results until every part is
    /// done or one fails. Returns the first failure.
    async fn dispatch(
        &self,
        session: &mut MultipartSession,
        todo: Vec<TransferPart>,
        store: &mut Option<&mut dyn SessionStore>,
        consumed: &mut u64,
        total: u64,
    ) -> Option<OosError> {
        if todo.is_empty() {
            return None;
        }

        let expected = todo.len();
        let cancel = CancellationToken::new();
        let (job_tx, job_rx) = mpsc::channel::<TransferPart>(self.routines);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<OosResult<CompletedPart>>(self.routines);

        let mut workers = JoinSet::new();
        for id in 0..self.routines.min(expected) {
            workers.spawn(worker(
                id,
                Arc::clone(&self.target),
                Arc::clone(&self.interceptor),
                session.session_id.clone(),
                Arc::clone(&job_rx),
                result_tx.clone(),
                cancel.clone(),
            ));
        }
        drop(result_tx);
        tokio::spawn(schedule(todo, job_tx, cancel.clone()));

        let failure = self
            .collect(session, &mut result_rx, expected, store, consumed, total)
            .await;
        if failure.is_some() {
            cancel.cancel();
        }
        // Parts in flight finish before the session is finalized or aborted.
        drop(result_rx);
        while workers.join_next().await.is_some() {}
        failure
    }

    async fn collect(
        &self,
        session: &mut MultipartSession,
        results: &mut mpsc::Receiver<OosResult<CompletedPart>>,
        expected: usize,
        store: &mut Option<&mut dyn SessionStore>,
        consumed: &mut u64,
        total: u64,
    ) -> Option<OosError> {
        let mut received = 0;
        while received < expected {
            match results.recv().await {
                Some(Ok(result)) => {
                    received += 1;
                    let number = result.part_number;
                    // The checkpoint is written before the in-memory session advances.
                    let mut next = session.clone();
                    let size = next.record(result);
                    persist(store, &next).await;
                    *session = next;
                    if let Some(size) = size {
                        *consumed += size;
                    }
                    debug!(part = number, received, expected, "part completed");
                    self.notify(ProgressEventKind::Data, *consumed, total);
                }
                Some(Err(err)) => return Some(err),
                None => {
                    return Some(OosError::Interrupted(format!(
                        "workers stopped after {received} of {expected} parts"
                    )));
                }
            }
        }
        None
    }

    /// Abort the remote session unless it is kept for a later resume.
    async fn unwind(&self, state: &mut Tracker, session_id: &str, resumable: bool) {
        if resumable {
            debug!(session_id, "keeping session for resume");
            state.advance(TransferState::Aborted);
            return;
        }
        state.advance(TransferState::Aborting);
        if let Err(err) = self.target.abort(session_id).await {
            error!(session_id, error = %err, "failed to abort multipart session");
        }
        state.advance(TransferState::Aborted);
    }

    fn notify(&self, kind: ProgressEventKind, consumed: u64, total: u64) {
        if let Some(listener) = &self.listener {
            listener.on_progress(&ProgressEvent::new(kind, consumed, total));
        }
    }
}

/// Save the session, tolerating failures.
async fn persist(store: &mut Option<&mut dyn SessionStore>, session: &MultipartSession) {
    if let Some(store) = store.as_mut() {
        if let Err(err) = store.save(session).await {
            warn!(error = %err, "failed to write checkpoint");
        }
    }
}

/// Enqueue parts in order until done or cancelled. Dropping the sender closes
/// the queue.
async fn schedule(todo: Vec<TransferPart>, jobs: mpsc::Sender<TransferPart>, cancel: CancellationToken) {
    for part in todo {
        tokio::select! {
            () = cancel.cancelled() => break,
            sent = jobs.send(part) => if sent.is_err() { break },
        }
    }
}

async fn worker<T: MultipartTarget>(
    id: usize,
    target: Arc<T>,
    interceptor: Arc<dyn PartInterceptor>,
    session_id: String,
    jobs: Arc<Mutex<mpsc::Receiver<TransferPart>>>,
    results: mpsc::Sender<OosResult<CompletedPart>>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let next = jobs.lock().await.recv().await;
        let Some(part) = next else { break };
        if cancel.is_cancelled() {
            break;
        }

        let result = match interceptor.intercept(&part) {
            Ok(()) => target.transfer(&session_id, part).await,
            Err(err) => Err(err),
        };
        let failed = result.is_err();
        if results.send(result).await.is_err() || failed {
            break;
        }
    }
    debug!(worker = id, "worker exited");
}

/// Logs state transitions.
struct Tracker {
    state: TransferState,
}

impl Tracker {
    fn new() -> Self {
        Self {
            state: TransferState::NotStarted,
        }
    }

    fn advance(&mut self, next: TransferState) {
        debug!(from = ?self.state, to = ?next, "transfer state changed");
        self.state = next;
    }
}
