//! Single-flight run scheduler.
//!
//! Every tool call becomes a [`Run`] at the tail of a FIFO queue. One drain
//! task pops the head and executes it to settlement before touching the
//! next, so at most one call is ever in flight. The drain task exists only
//! while the queue is non-empty; enqueueing restarts it when needed.
//!
//! Locking: `State` sits behind a std `Mutex` held only for short,
//! await-free sections. Events are emitted while the lock is held, which is
//! what makes the per-run event order airtight.

use crate::error::RunError;
use crate::event::{HistorySnapshot, RunEvent};
use crate::history::RunHistory;
use crate::run::{self, Run, RunState};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// The channel a run executes against. Implemented by
/// [`tether_mcp::McpClient`]; tests substitute scripted fakes.
pub trait ToolChannel: Send + Sync {
    fn call_tool<'a>(
        &'a self,
        tool: &'a str,
        arguments: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, tether_mcp::McpError>> + Send + 'a>>;
}

impl ToolChannel for tether_mcp::McpClient {
    fn call_tool<'a>(
        &'a self,
        tool: &'a str,
        arguments: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, tether_mcp::McpError>> + Send + 'a>>
    {
        Box::pin(tether_mcp::McpClient::call_tool(self, tool, arguments))
    }
}

/// Tunables. The defaults match the observed constants; tests shrink the
/// tick to keep progress assertions fast.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub history_cap: usize,
    pub tick: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            history_cap: 100,
            tick: Duration::from_secs(1),
        }
    }
}

/// Caller-supplied metadata for an enqueued call.
#[derive(Debug, Clone, Default)]
pub struct RunMeta {
    /// Display model label; wins over argument sniffing.
    pub model: Option<String>,
}

/// One entry for [`Scheduler::run_tools`].
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub meta: Option<RunMeta>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            meta: None,
        }
    }
}

/// Ticket for an enqueued run: its id, plus a future that settles when the
/// run reaches a terminal state.
pub struct RunHandle {
    id: u64,
    rx: oneshot::Receiver<Result<serde_json::Value, RunError>>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn wait(self) -> Result<serde_json::Value, RunError> {
        match self.rx.await {
            Ok(settled) => settled,
            Err(_) => Err(RunError::Detached),
        }
    }
}

struct QueuedRun {
    run: Run,
    done_tx: oneshot::Sender<Result<serde_json::Value, RunError>>,
    cancel: CancellationToken,
}

struct ActiveRun {
    run: Run,
    cancel: CancellationToken,
}

struct State {
    pending: VecDeque<QueuedRun>,
    active: Option<ActiveRun>,
    history: RunHistory,
    draining: bool,
}

struct Inner {
    channel: Arc<dyn ToolChannel>,
    state: Mutex<State>,
    events: broadcast::Sender<RunEvent>,
    next_id: AtomicU64,
    tick: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("scheduler state poisoned")
    }

    fn emit(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_history(&self, state: &State) {
        self.emit(RunEvent::HistoryUpdated(snapshot(state)));
    }
}

fn snapshot(state: &State) -> HistorySnapshot {
    let now = run::now_ms();
    let mut queue = Vec::with_capacity(state.pending.len() + 1);
    if let Some(active) = &state.active {
        let mut r = active.run.clone();
        r.refresh_elapsed(now);
        queue.push(r);
    }
    for queued in &state.pending {
        let mut r = queued.run.clone();
        r.refresh_elapsed(now);
        queue.push(r);
    }
    HistorySnapshot {
        queue,
        completed: state.history.snapshot(),
    }
}

fn finalize_cancelled(run: Run) -> Run {
    let now = run::now_ms();
    let mut run = run;
    run.state = RunState::Cancelled;
    run.cancelled = true;
    run.finished_at = Some(now);
    run.refresh_elapsed(now);
    run
}

/// Serializes tool calls against one [`ToolChannel`] with live status,
/// cancellation, and a bounded completed-run history. Cheap to clone; all
/// clones share the same queue and subscribers.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(channel: Arc<dyn ToolChannel>, options: SchedulerOptions) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                channel,
                state: Mutex::new(State {
                    pending: VecDeque::new(),
                    active: None,
                    history: RunHistory::new(options.history_cap),
                    draining: false,
                }),
                events,
                next_id: AtomicU64::new(1),
                tick: options.tick,
            }),
        }
    }

    /// Subscribe to lifecycle events. Each receiver is independent; dropping
    /// it unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.events.subscribe()
    }

    /// Queue a tool call. Never blocks: the `runQueued` event fires
    /// synchronously and execution happens on the drain task. Must be called
    /// from within a tokio runtime.
    pub fn enqueue(
        &self,
        tool: impl Into<String>,
        arguments: serde_json::Value,
        meta: Option<RunMeta>,
    ) -> RunHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let model = run::extract_model(
            meta.as_ref().and_then(|m| m.model.as_deref()),
            &arguments,
        );
        let run = Run::new(id, tool.into(), model, arguments);
        let (done_tx, done_rx) = oneshot::channel();

        let mut state = self.inner.lock();
        state.pending.push_back(QueuedRun {
            run: run.clone(),
            done_tx,
            cancel: CancellationToken::new(),
        });
        self.inner.emit(RunEvent::RunQueued(run));
        if !state.draining {
            state.draining = true;
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
        drop(state);

        RunHandle { id, rx: done_rx }
    }

    /// Enqueue a batch and await every run's settlement, returning results
    /// in submission order. Execution is still strictly sequential.
    pub async fn run_tools(
        &self,
        calls: Vec<ToolCall>,
    ) -> Vec<Result<serde_json::Value, RunError>> {
        let handles: Vec<RunHandle> = calls
            .into_iter()
            .map(|call| self.enqueue(call.tool, call.arguments, call.meta))
            .collect();
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.wait().await);
        }
        results
    }

    /// Cancel a run.
    ///
    /// Active: the in-flight call is flagged; its eventual channel
    /// resolution is ignored and the run settles as cancelled. Queued: the
    /// run is removed and finalized immediately, without ever touching the
    /// channel. Returns false for unknown, already-terminal, or
    /// already-cancelled runs, so a second cancel is always safe.
    pub fn cancel_run(&self, id: u64) -> bool {
        let mut state = self.inner.lock();

        if let Some(active) = state.active.as_mut() {
            if active.run.id == id {
                if active.cancel.is_cancelled() {
                    return false;
                }
                active.run.cancelled = true;
                active.cancel.cancel();
                return true;
            }
        }

        if let Some(pos) = state.pending.iter().position(|q| q.run.id == id) {
            let queued = state
                .pending
                .remove(pos)
                .expect("position is within the queue");
            let run = finalize_cancelled(queued.run);
            state.history.record(run.clone());
            self.inner.emit(RunEvent::RunCancelled(run));
            self.inner.emit_history(&state);
            drop(state);
            let _ = queued.done_tx.send(Err(RunError::Cancelled));
            return true;
        }

        tracing::debug!("cancel requested for unknown or already-settled run {id}");
        false
    }

    /// Snapshot of the live queue (active first) and completed history,
    /// with elapsed times recomputed. Independent of internal state.
    pub fn get_run_history(&self) -> HistorySnapshot {
        snapshot(&self.inner.lock())
    }
}

/// What the select loop settles with.
enum Settled {
    Cancelled,
    Response(Result<serde_json::Value, tether_mcp::McpError>),
}

async fn drain(inner: Arc<Inner>) {
    loop {
        // Claim the head under the lock so every run is in exactly one of
        // pending, the active slot, or history at any instant.
        let claimed = {
            let mut state = inner.lock();
            let Some(queued) = state.pending.pop_front() else {
                state.draining = false;
                return;
            };
            if queued.cancel.is_cancelled() || queued.run.cancelled {
                let run = finalize_cancelled(queued.run);
                state.history.record(run.clone());
                inner.emit(RunEvent::RunCancelled(run));
                inner.emit_history(&state);
                drop(state);
                let _ = queued.done_tx.send(Err(RunError::Cancelled));
                continue;
            }
            let now = run::now_ms();
            let mut run = queued.run;
            run.state = RunState::Running;
            run.started_at = Some(now);
            run.refresh_elapsed(now);
            state.active = Some(ActiveRun {
                run: run.clone(),
                cancel: queued.cancel.clone(),
            });
            inner.emit(RunEvent::RunStarted(run.clone()));
            (run, queued.cancel, queued.done_tx)
        };
        execute(&inner, claimed).await;
    }
}

async fn execute(
    inner: &Arc<Inner>,
    (run, cancel, done_tx): (
        Run,
        CancellationToken,
        oneshot::Sender<Result<serde_json::Value, RunError>>,
    ),
) {
    let tool = run.tool.clone();
    let arguments = run.arguments.clone();
    let mut call = inner.channel.call_tool(&tool, arguments);

    // First progress tick one period in; dropping the ticker at the end of
    // this scope is what stops it.
    let mut ticker = tokio::time::interval_at(Instant::now() + inner.tick, inner.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Settled::Cancelled,
            result = &mut call => break Settled::Response(result),
            _ = ticker.tick() => {
                let progress = {
                    let mut state = inner.lock();
                    state.active.as_mut().map(|active| {
                        active.run.refresh_elapsed(run::now_ms());
                        active.run.clone()
                    })
                };
                if let Some(snapshot) = progress {
                    inner.emit(RunEvent::RunProgress(snapshot));
                }
            }
        }
    };

    // Settle under the lock. A cancel that raced the response wins; the
    // response is then discarded like any other late reply.
    let mut state = inner.lock();
    let active = state.active.take().expect("drain claimed the active slot");
    let mut run = active.run;
    let now = run::now_ms();
    run.finished_at = Some(now);
    run.refresh_elapsed(now);

    let settled = match outcome {
        Settled::Response(result) if !cancel.is_cancelled() => result.map_err(RunError::from),
        _ => Err(RunError::Cancelled),
    };
    let event = match &settled {
        Ok(value) => {
            run.state = RunState::Done;
            run.result = Some(value.clone());
            RunEvent::RunFinished(run.clone())
        }
        Err(RunError::Cancelled) => {
            run.state = RunState::Cancelled;
            run.cancelled = true;
            RunEvent::RunCancelled(run.clone())
        }
        Err(e) => {
            run.state = RunState::Failed;
            run.error = Some(e.to_string());
            RunEvent::RunFailed(run.clone())
        }
    };
    state.history.record(run.clone());
    tracing::debug!(
        "run {} ({}) settled as {:?} after {}ms, {} completed in history",
        run.id,
        run.tool,
        run.state,
        run.elapsed_ms,
        state.history.len()
    );
    inner.emit(event);
    inner.emit_history(&state);
    drop(state);

    let _ = done_tx.send(settled);
}
