use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use verdict_core::{Phase, RunState, SourceItem, StoreError, VerdictMarkers, WorkItemStore};
use verdict_logging::{verdict_debug, verdict_error, verdict_info, verdict_warn};

use crate::classifier::Classifier;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot {operation} while the run is {phase:?}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },
    #[error("no pending item to resume")]
    NothingToResume,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("run state lock poisoned")]
    Poisoned,
    #[error("run task failed: {0}")]
    TaskPanicked(String),
}

/// Why a run returned to `Idle` without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Exhausted,
    Cancelled,
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct RunnerOptions {
    pub markers: VerdictMarkers,
    pub clock: Clock,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            markers: VerdictMarkers::default(),
            clock: Arc::new(Utc::now),
        }
    }
}

struct Inner {
    store: WorkItemStore,
    /// Token of the active run, if any.
    cancel: Option<CancellationToken>,
}

struct Shared {
    inner: Mutex<Inner>,
    classifier: Arc<dyn Classifier>,
    options: RunnerOptions,
    phase_tx: watch::Sender<Phase>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, Inner>, RunError> {
        self.inner.lock().map_err(|_| RunError::Poisoned)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.options.clock)()
    }

    fn publish(&self, phase: Phase) {
        self.phase_tx.send_replace(phase);
    }

    fn begin(&self, inner: &mut Inner, from: usize) -> Result<CancellationToken, RunError> {
        inner.store.begin_run(from, self.now())?;
        let token = CancellationToken::new();
        inner.cancel = Some(token.clone());
        self.publish(Phase::Running);
        Ok(token)
    }

    /// Normal end of a run. `in_flight` is reverted before going idle.
    fn stop(
        &self,
        inner: &mut Inner,
        in_flight: Option<usize>,
        reason: StopReason,
    ) -> Result<StopReason, RunError> {
        if let Some(index) = in_flight {
            inner.store.revert_to_pending(index)?;
        }
        inner.store.finish_run(self.now())?;
        inner.cancel = None;
        self.publish(Phase::Idle);
        verdict_info!("Run stopped: {:?}", reason);
        Ok(reason)
    }

    /// Forces `Idle` after a fatal error.
    fn abandon(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let in_flight = inner.store.state().in_flight_indices();
        if !in_flight.is_empty() {
            verdict_warn!("Reverting in-flight items {:?} after aborted run", in_flight);
        }
        if let Err(err) = inner.store.abandon_run(self.now()) {
            verdict_error!("Failed to persist idle phase after aborted run: {}", err);
        }
        inner.cancel = None;
        self.publish(Phase::Idle);
    }
}

fn require_idle(inner: &Inner, operation: &'static str) -> Result<(), RunError> {
    match inner.store.phase() {
        Phase::Idle => Ok(()),
        phase => Err(RunError::InvalidState { operation, phase }),
    }
}

fn is_cancelling(inner: &Inner, token: &CancellationToken) -> bool {
    token.is_cancelled() || inner.store.phase() == Phase::Cancelling
}

/// Completion of a spawned run.
#[derive(Debug)]
pub struct RunHandle {
    task: JoinHandle<Result<StopReason, RunError>>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<StopReason, RunError> {
        self.task
            .await
            .map_err(|err| RunError::TaskPanicked(err.to_string()))?
    }
}

/// Sequential runner over the items of a [`WorkItemStore`].
///
/// At most one classifier call is outstanding at any time. `start` and
/// `resume` spawn the loop on the current tokio runtime and return at once;
/// `cancel` only requests a stop, which the loop observes before dispatching
/// the next item or when the outstanding call returns.
#[derive(Clone)]
pub struct RunController {
    shared: Arc<Shared>,
}

impl RunController {
    /// Takes ownership of a store that has already been through recovery.
    pub fn new(
        store: WorkItemStore,
        classifier: Arc<dyn Classifier>,
        options: RunnerOptions,
    ) -> Self {
        let (phase_tx, _) = watch::channel(store.phase());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    store,
                    cancel: None,
                }),
                classifier,
                options,
                phase_tx,
            }),
        }
    }

    /// Seeds `items` and runs them from the first one.
    pub fn start(&self, items: Vec<SourceItem>) -> Result<RunHandle, RunError> {
        let token = {
            let mut inner = self.shared.lock()?;
            require_idle(&inner, "start")?;
            let count = items.len();
            inner.store.seed(items)?;
            let token = self.shared.begin(&mut inner, 0)?;
            verdict_info!("Run started with {} items", count);
            token
        };
        Ok(self.spawn(0, token))
    }

    /// Continues from the first pending item without reseeding.
    pub fn resume(&self) -> Result<RunHandle, RunError> {
        let (from, token) = {
            let mut inner = self.shared.lock()?;
            require_idle(&inner, "resume")?;
            let from = inner
                .store
                .state()
                .first_pending_from(0)
                .ok_or(RunError::NothingToResume)?;
            let token = self.shared.begin(&mut inner, from)?;
            verdict_info!("Run resumed at item {}", from);
            (from, token)
        };
        Ok(self.spawn(from, token))
    }

    /// Requests cancellation of the active run. Does not wait for it.
    pub fn cancel(&self) -> Result<(), RunError> {
        let mut inner = self.shared.lock()?;
        let phase = inner.store.phase();
        if phase != Phase::Running {
            return Err(RunError::InvalidState {
                operation: "cancel",
                phase,
            });
        }
        // The token fires first so the loop stops even if the phase write fails.
        if let Some(token) = &inner.cancel {
            token.cancel();
        }
        inner.store.request_cancel()?;
        self.shared.publish(Phase::Cancelling);
        verdict_info!("Cancellation requested");
        Ok(())
    }

    pub fn snapshot(&self) -> Result<RunState, RunError> {
        Ok(self.shared.lock()?.store.snapshot())
    }

    /// Clears all items and timing. Only allowed while idle.
    pub fn reset(&self) -> Result<(), RunError> {
        let mut inner = self.shared.lock()?;
        require_idle(&inner, "reset")?;
        inner.store.reset()?;
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        *self.shared.phase_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.shared.phase_tx.subscribe()
    }

    /// Resolves once the phase is `Idle`.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|phase| *phase == Phase::Idle).await;
    }

    fn spawn(&self, from: usize, token: CancellationToken) -> RunHandle {
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            // The loop runs in its own task so a panicking classifier still
            // lets the supervisor force the phase back to idle.
            let worker = tokio::spawn(drive(shared.clone(), from, token));
            match worker.await {
                Ok(result) => result,
                Err(err) => {
                    verdict_error!("Run task failed: {}", err);
                    shared.abandon();
                    Err(RunError::TaskPanicked(err.to_string()))
                }
            }
        });
        RunHandle { task }
    }
}

async fn drive(
    shared: Arc<Shared>,
    from: usize,
    token: CancellationToken,
) -> Result<StopReason, RunError> {
    match run_items(&shared, from, &token).await {
        Ok(reason) => Ok(reason),
        Err(err) => {
            verdict_error!("Run aborted: {}", err);
            shared.abandon();
            Err(err)
        }
    }
}

async fn run_items(
    shared: &Shared,
    from: usize,
    token: &CancellationToken,
) -> Result<StopReason, RunError> {
    let mut position = from;
    loop {
        let (index, url) = {
            let mut inner = shared.lock()?;
            if is_cancelling(&inner, token) {
                return shared.stop(&mut inner, None, StopReason::Cancelled);
            }
            let Some(index) = inner.store.state().first_pending_from(position) else {
                return shared.stop(&mut inner, None, StopReason::Exhausted);
            };
            inner.store.mark_in_flight(index)?;
            (index, inner.store.state().items()[index].url.clone())
        };
        verdict_debug!("Dispatching item {}: {}", index, url);

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = shared.classifier.classify(&url, token.child_token()) => Some(result),
        };

        let mut inner = shared.lock()?;
        let result = match result {
            Some(result) if !is_cancelling(&inner, token) => result,
            late => {
                if late.is_some() {
                    verdict_info!("Discarding response for item {} received after cancel", index);
                }
                return shared.stop(&mut inner, Some(index), StopReason::Cancelled);
            }
        };
        match result {
            Ok(outcome) => {
                let derived = shared.options.markers.derive(&outcome);
                verdict_debug!("Item {} succeeded: {:?}", index, derived);
                inner.store.mark_succeeded(index, outcome, derived)?;
            }
            Err(err) => {
                verdict_warn!("Item {} failed: {}", index, err);
                inner.store.mark_failed(index, err.to_string())?;
            }
        }
        position = index + 1;
    }
}
