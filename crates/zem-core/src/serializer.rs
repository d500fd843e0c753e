//! Execution serializer: one dedicated thread owns a piece of state (the entry
//! store) and runs submitted jobs against it strictly one at a time in FIFO order.
//!
//! Jobs are either fire-and-forget ([`Serializer::submit`], [`Serializer::submit_with`])
//! or blocking ([`Serializer::call`]). A blocking call made from inside a running job
//! executes in place, so jobs can compose without deadlocking the owner.
//!
//! Cancellation is cooperative: [`Serializer::interrupt`] flips the interrupt token of
//! the currently running cancellable job and [`Serializer::interrupt_pending`] also
//! drops every cancellable job queued before the call.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

// a fresh serializer is idle (0)
const RUNNING: u8 = 1;
/// the stop sentinel is queued, no more jobs are accepted
const STOPPING: u8 = 2;
const STOPPED: u8 = 3;

/// Whether a job may be interrupted or dropped by the interrupt calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Queries: may be interrupted while running and dropped while queued
    Cancellable,
    /// Store writes and bookkeeping: always run to completion
    Uninterruptible,
}

/// Handed to every job, polled by long running work
#[derive(Debug, Clone)]
pub struct InterruptToken {
    epoch: Option<Arc<AtomicU64>>,
    started_at: u64,
}

impl InterruptToken {
    /// A token that is never interrupted, for running store work directly
    pub fn never() -> Self {
        Self {
            epoch: None,
            started_at: 0,
        }
    }

    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.epoch
            .as_ref()
            .is_some_and(|epoch| epoch.load(Ordering::Acquire) != self.started_at)
    }

    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_interrupted() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Counters of finished jobs, by terminal state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializerStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
}

type Work<S> = Box<dyn FnOnce(&S, &InterruptToken) -> Outcome + Send>;

struct Job<S> {
    seq: u64,
    kind: JobKind,
    work: Work<S>,
}

enum Message<S> {
    Job(Job<S>),
    Stop,
}

#[derive(Default)]
struct Shared {
    state: AtomicU8,
    owner: OnceLock<ThreadId>,
    epoch: Arc<AtomicU64>,
    next_seq: AtomicU64,
    /// cancellable jobs with a sequence number below this are dropped
    drop_below: AtomicU64,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn token(&self, kind: JobKind) -> InterruptToken {
        match kind {
            JobKind::Cancellable => InterruptToken {
                epoch: Some(Arc::clone(&self.epoch)),
                started_at: self.epoch.load(Ordering::Acquire),
            },
            JobKind::Uninterruptible => InterruptToken::never(),
        }
    }
}

pub struct Serializer<S: Send + Sync + 'static> {
    name: String,
    state: Arc<S>,
    shared: Arc<Shared>,
    sender: Sender<Message<S>>,
    receiver: Mutex<Option<Receiver<Message<S>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// orders job sends against the stop sentinel
    send_lock: Mutex<()>,
    background: bool,
}

impl<S: Send + Sync + 'static> std::fmt::Debug for Serializer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("background", &self.background)
            .finish()
    }
}

impl<S: Send + Sync + 'static> Serializer<S> {
    /// Create a serializer owning `state`. Nothing runs until [`Serializer::start`].
    pub fn new(name: impl Into<String>, state: S) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            name: name.into(),
            state: Arc::new(state),
            shared: Arc::new(Shared::default()),
            sender,
            receiver: Mutex::new(Some(receiver)),
            handle: Mutex::new(None),
            send_lock: Mutex::new(()),
            background: false,
        }
    }

    /// Background serializers may be dropped while running without a warning
    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Result<()> {
        let Some(receiver) = self.receiver.lock().take() else {
            debug!(name = %self.name, "Execution serializer already started or stopped");
            return Ok(());
        };

        let state = Arc::clone(&self.state);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || owner_loop(receiver, state, shared))
            .map_err(Error::SpawnThread)?;

        let _ = self.shared.owner.set(handle.thread().id());
        self.shared.state.store(RUNNING, Ordering::Release);
        *self.handle.lock() = Some(handle);

        debug!(name = %self.name, "Execution serializer started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == RUNNING
    }

    /// True when called from the owner thread, i.e. from inside a running job
    pub fn is_owner_context(&self) -> bool {
        self.shared
            .owner
            .get()
            .is_some_and(|owner| *owner == thread::current().id())
    }

    pub fn stats(&self) -> SerializerStats {
        SerializerStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    /// Accepted jobs that have not finished yet
    fn pending_jobs(&self) -> u64 {
        let stats = self.stats();
        stats
            .submitted
            .saturating_sub(stats.completed + stats.failed + stats.dropped)
    }

    fn enqueue(&self, kind: JobKind, work: Work<S>) -> Option<u64> {
        let _send = self.send_lock.lock();
        if self.shared.state.load(Ordering::Acquire) >= STOPPING {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let seq = self.shared.next_seq.fetch_add(1, Ordering::AcqRel);
        match self.sender.send(Message::Job(Job { seq, kind, work })) {
            Ok(()) => {
                self.shared.submitted.fetch_add(1, Ordering::Relaxed);
                trace!(seq, ?kind, "Job queued");
                Some(seq)
            }
            Err(_) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Fire-and-forget. An error result is logged on the owner thread.
    pub fn submit<T, F>(&self, kind: JobKind, work: F) -> Option<u64>
    where
        T: 'static,
        F: FnOnce(&S, &InterruptToken) -> Result<T> + Send + 'static,
    {
        let name = self.name.clone();
        let seq = self.enqueue(
            kind,
            Box::new(move |state: &S, token: &InterruptToken| match work(state, token) {
                Ok(_) => Outcome::Completed,
                Err(e) => {
                    warn!(serializer = %name, error = %e, "Background job failed");
                    Outcome::Failed
                }
            }),
        );

        if seq.is_none() {
            warn!(name = %self.name, "Job submitted to a stopped serializer was discarded");
        }
        seq
    }

    /// Fire-and-forget with a completion callback invoked on the owner thread.
    /// Jobs dropped by [`Serializer::interrupt_pending`] never invoke it.
    pub fn submit_with<T, F, C>(&self, kind: JobKind, work: F, on_complete: C) -> Option<u64>
    where
        T: 'static,
        F: FnOnce(&S, &InterruptToken) -> Result<T> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let seq = self.enqueue(
            kind,
            Box::new(move |state: &S, token: &InterruptToken| {
                let result = work(state, token);
                let outcome = if result.is_ok() {
                    Outcome::Completed
                } else {
                    Outcome::Failed
                };
                on_complete(result);
                outcome
            }),
        );

        if seq.is_none() {
            warn!(name = %self.name, "Job submitted to a stopped serializer was discarded");
        }
        seq
    }

    /// Run `work` on the owner and wait for its result. Errors come back unchanged
    /// and a panic inside `work` is resumed on the caller with its original payload.
    ///
    /// A timeout only releases the caller: the job stays queued and still runs.
    pub fn call<T, F>(&self, kind: JobKind, work: F, timeout: Option<Duration>) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S, &InterruptToken) -> Result<T> + Send + 'static,
    {
        if self.is_owner_context() {
            let token = self.shared.token(kind);
            return work(&*self.state, &token);
        }

        if !self.is_running() {
            return Err(Error::NotStarted);
        }

        let (tx, rx) = mpsc::sync_channel::<thread::Result<Result<T>>>(1);
        let seq = self
            .enqueue(
                kind,
                Box::new(move |state: &S, token: &InterruptToken| {
                    let result = catch_unwind(AssertUnwindSafe(|| work(state, token)));
                    let outcome = match result {
                        Ok(Ok(_)) => Outcome::Completed,
                        _ => Outcome::Failed,
                    };
                    // the caller may have timed out already
                    let _ = tx.send(result);
                    outcome
                }),
            )
            .ok_or(Error::NotStarted)?;

        let received = match timeout {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    debug!(seq, ?timeout, "Blocking call timed out");
                    Error::Timeout
                }
                RecvTimeoutError::Disconnected => Error::Dropped,
            })?,
            None => rx.recv().map_err(|_| Error::Dropped)?,
        };

        match received {
            Ok(result) => result,
            Err(payload) => resume_unwind(payload),
        }
    }

    /// Interrupt the currently running cancellable job
    pub fn interrupt(&self) {
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        trace!(name = %self.name, "Interrupt requested");
    }

    /// Interrupt the running job and drop every cancellable job queued so far
    pub fn interrupt_pending(&self) {
        let watermark = self.shared.next_seq.load(Ordering::Acquire);
        self.shared
            .drop_below
            .fetch_max(watermark, Ordering::AcqRel);
        self.interrupt();
    }

    /// Run everything queued so far, then shut the owner down and join it.
    /// Jobs accepted before [`Serializer::start`] still run: a serializer that
    /// never started is started to drain them. Jobs submitted once stopping
    /// has begun are refused.
    pub fn stop(&self) -> Result<()> {
        if self.handle.lock().is_none() && self.pending_jobs() > 0 {
            debug!(
                name = %self.name,
                pending = self.pending_jobs(),
                "Starting execution serializer to run jobs queued before start"
            );
            self.start()?;
        }

        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            self.receiver.lock().take();
            self.shared.state.store(STOPPED, Ordering::Release);
            return Ok(());
        };

        {
            let _send = self.send_lock.lock();
            self.shared.state.store(STOPPING, Ordering::Release);
            let _ = self.sender.send(Message::Stop);
        }

        if handle.thread().id() == thread::current().id() {
            // stopping from inside a job: the owner exits after the current job
            debug!(name = %self.name, "Stop requested from the owner thread");
            return Ok(());
        }

        handle.join().map_err(|_| Error::ThreadPanic)?;
        debug!(name = %self.name, stats = ?self.stats(), "Execution serializer stopped");
        Ok(())
    }
}

impl<S: Send + Sync + 'static> Drop for Serializer<S> {
    fn drop(&mut self) {
        let running = self.handle.get_mut().is_some();
        let queued = if self.receiver.get_mut().is_some() {
            self.pending_jobs()
        } else {
            0
        };
        if !running && queued == 0 {
            return;
        }

        if let Err(e) = self.stop() {
            error!(name = %self.name, error = %e, "Failed to stop execution serializer");
        }

        if self.background {
            return;
        }
        if running {
            warn!(
                name = %self.name,
                "Execution serializer dropped while running, call stop() before dropping it"
            );
        } else {
            warn!(
                name = %self.name,
                queued,
                "Execution serializer dropped with jobs queued before start, they ran on drop"
            );
        }
    }
}

fn owner_loop<S>(receiver: Receiver<Message<S>>, state: Arc<S>, shared: Arc<Shared>) {
    let _ = shared.owner.set(thread::current().id());

    for message in receiver.iter() {
        match message {
            Message::Stop => break,
            Message::Job(job) => run_job(job, &*state, &*shared),
        }
    }

    shared.state.store(STOPPED, Ordering::Release);
}

fn run_job<S>(job: Job<S>, state: &S, shared: &Shared) {
    let Job { seq, kind, work } = job;

    if kind == JobKind::Cancellable && seq < shared.drop_below.load(Ordering::Acquire) {
        shared.dropped.fetch_add(1, Ordering::Relaxed);
        trace!(seq, "Job dropped");
        return;
    }

    let token = shared.token(kind);
    trace!(seq, "Job running");

    match catch_unwind(AssertUnwindSafe(|| work(state, &token))) {
        Ok(Outcome::Completed) => {
            shared.completed.fetch_add(1, Ordering::Relaxed);
            trace!(seq, "Job completed");
        }
        Ok(Outcome::Failed) => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            trace!(seq, "Job failed");
        }
        Err(payload) => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            error!(seq, panic = %panic_message(payload.as_ref()), "Job panicked");
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn started<S: Send + Sync + 'static>(state: S) -> Serializer<S> {
        let serializer = Serializer::new("zem-test", state);
        serializer.start().unwrap();
        serializer
    }

    #[test]
    fn test_fifo_order_with_jobs_queued_before_start() {
        let serializer = Serializer::new("zem-test", Mutex::new(Vec::new()));
        for i in 0..10 {
            serializer.submit(JobKind::Uninterruptible, move |log: &Mutex<Vec<i32>>, _| {
                log.lock().push(i);
                Ok(())
            });
        }

        serializer.start().unwrap();
        let seen = serializer
            .call(
                JobKind::Uninterruptible,
                |log, _| Ok(log.lock().clone()),
                None,
            )
            .unwrap();

        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        serializer.stop().unwrap();
    }

    #[test]
    fn test_call_before_start_is_not_started() {
        let serializer = Serializer::new("zem-test", ());
        let result = serializer.call(JobKind::Uninterruptible, |_, _| Ok(1), None);
        assert!(matches!(result, Err(Error::NotStarted)));
        serializer.stop().unwrap();
    }

    #[test]
    fn test_call_after_stop_is_not_started() {
        let serializer = started(());
        serializer.stop().unwrap();
        let result = serializer.call(JobKind::Uninterruptible, |_, _| Ok(1), None);
        assert!(matches!(result, Err(Error::NotStarted)));
    }

    #[test]
    fn test_call_returns_value_and_error_unchanged() {
        let serializer = started(());
        let value = serializer.call(JobKind::Uninterruptible, |_, _| Ok(42), None);
        assert_eq!(value.unwrap(), 42);

        let err = serializer.call::<(), _>(
            JobKind::Uninterruptible,
            |_, _| Err(Error::InvalidClause("name/prefix".to_string())),
            None,
        );
        assert!(matches!(err, Err(Error::InvalidClause(ref m)) if m == "name/prefix"));
        serializer.stop().unwrap();
    }

    #[test]
    fn test_call_from_owner_runs_inline() {
        let serializer = Arc::new(started(Mutex::new(Vec::new())));
        let inner = Arc::clone(&serializer);

        let result = serializer.call(
            JobKind::Uninterruptible,
            move |log: &Mutex<Vec<i32>>, _| {
                assert!(inner.is_owner_context());
                log.lock().push(1);
                let nested = inner.call(
                    JobKind::Uninterruptible,
                    |log: &Mutex<Vec<i32>>, _| {
                        log.lock().push(2);
                        Ok(3)
                    },
                    None,
                )?;
                log.lock().push(nested);
                Ok(log.lock().clone())
            },
            None,
        );

        assert_eq!(result.unwrap(), vec![1, 2, 3]);
        assert!(!serializer.is_owner_context());
        serializer.stop().unwrap();
    }

    #[test]
    fn test_submit_from_owner_runs_after_current_job() {
        let serializer = Arc::new(started(Mutex::new(Vec::new())));
        let inner = Arc::clone(&serializer);

        let len_inside = serializer
            .call(
                JobKind::Uninterruptible,
                move |log: &Mutex<Vec<i32>>, _| {
                    inner.submit(JobKind::Uninterruptible, |log: &Mutex<Vec<i32>>, _| {
                        log.lock().push(42);
                        Ok(())
                    });
                    Ok(log.lock().len())
                },
                None,
            )
            .unwrap();
        let seen_after = serializer
            .call(JobKind::Uninterruptible, |log, _| Ok(log.lock().clone()), None)
            .unwrap();

        assert_eq!(len_inside, 0);
        assert_eq!(seen_after, vec![42]);
        serializer.stop().unwrap();
    }

    #[test]
    fn test_call_timeout_does_not_cancel_job() {
        let serializer = started(AtomicUsize::new(0));

        let result = serializer.call(
            JobKind::Uninterruptible,
            |counter: &AtomicUsize, _| {
                thread::sleep(Duration::from_millis(200));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Some(Duration::from_millis(10)),
        );
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(Error::Timeout.is_transient());

        // still queued behind the slow job, so this observes its side effect
        let count = serializer
            .call(
                JobKind::Uninterruptible,
                |counter, _| Ok(counter.load(Ordering::SeqCst)),
                None,
            )
            .unwrap();
        assert_eq!(count, 1);
        serializer.stop().unwrap();
    }

    #[test]
    fn test_panic_is_resumed_on_caller_and_owner_survives() {
        let serializer = started(());

        let caught = catch_unwind(AssertUnwindSafe(|| {
            serializer.call::<(), _>(JobKind::Uninterruptible, |_, _| panic!("boom"), None)
        }));
        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

        let value = serializer.call(JobKind::Uninterruptible, |_, _| Ok("alive"), None);
        assert_eq!(value.unwrap(), "alive");
        assert_eq!(serializer.stats().failed, 1);
        serializer.stop().unwrap();
    }

    #[test]
    fn test_fire_and_forget_failures_are_contained() {
        let serializer = started(());

        serializer.submit::<(), _>(JobKind::Uninterruptible, |_, _| panic!("background"));
        serializer.submit::<(), _>(JobKind::Uninterruptible, |_, _| {
            Err(Error::Scanner {
                source_name: "tags".to_string(),
                message: "missing".to_string(),
            })
        });

        let value = serializer.call(JobKind::Uninterruptible, |_, _| Ok(7), None);
        assert_eq!(value.unwrap(), 7);

        assert_eq!(serializer.stats().failed, 2);
        serializer.stop().unwrap();
    }

    #[test]
    fn test_submit_with_delivers_result_on_owner() {
        let serializer = started(());
        let (tx, rx) = mpsc::channel();

        serializer.submit_with(
            JobKind::Cancellable,
            |_, _| Ok(5),
            move |result: Result<i32>| {
                tx.send((result.ok(), thread::current().name().map(str::to_string)))
                    .unwrap();
            },
        );

        let (value, thread_name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(value, Some(5));
        assert_eq!(thread_name.as_deref(), Some("zem-test"));
        serializer.stop().unwrap();
    }

    #[test]
    fn test_interrupt_stops_running_cancellable_job() {
        let serializer = Arc::new(started(()));
        let (started_tx, started_rx) = mpsc::channel();

        let caller = {
            let serializer = Arc::clone(&serializer);
            thread::spawn(move || {
                serializer.call(
                    JobKind::Cancellable,
                    move |_, token| {
                        started_tx.send(()).unwrap();
                        let deadline = Instant::now() + Duration::from_secs(5);
                        while Instant::now() < deadline {
                            token.check()?;
                            thread::sleep(Duration::from_millis(1));
                        }
                        Ok(())
                    },
                    None,
                )
            })
        };

        started_rx.recv().unwrap();
        serializer.interrupt();
        let result = caller.join().unwrap();
        assert!(matches!(result, Err(Error::Interrupted)));

        // a job started after the interrupt is not affected
        let interrupted = serializer
            .call(
                JobKind::Cancellable,
                |_, token| Ok(token.is_interrupted()),
                None,
            )
            .unwrap();
        assert!(!interrupted);
        serializer.stop().unwrap();
    }

    #[test]
    fn test_uninterruptible_jobs_ignore_interrupt() {
        let serializer = Arc::new(started(()));
        let (started_tx, started_rx) = mpsc::channel();

        let caller = {
            let serializer = Arc::clone(&serializer);
            thread::spawn(move || {
                serializer.call(
                    JobKind::Uninterruptible,
                    move |_, token| {
                        started_tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(50));
                        token.check()?;
                        Ok("written")
                    },
                    None,
                )
            })
        };

        started_rx.recv().unwrap();
        serializer.interrupt_pending();
        assert_eq!(caller.join().unwrap().unwrap(), "written");
        serializer.stop().unwrap();
    }

    #[test]
    fn test_interrupt_pending_drops_queued_cancellable_jobs() {
        let serializer = started(Mutex::new(Vec::<&'static str>::new()));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let callbacks = Arc::new(AtomicUsize::new(0));

        serializer.submit(JobKind::Uninterruptible, move |_, _| {
            let _ = gate_rx.recv();
            Ok(())
        });
        for _ in 0..2 {
            let callbacks = Arc::clone(&callbacks);
            serializer.submit_with(
                JobKind::Cancellable,
                |log: &Mutex<Vec<&'static str>>, _| {
                    log.lock().push("query");
                    Ok(())
                },
                move |_| {
                    callbacks.fetch_add(1, Ordering::SeqCst);
                },
            );
        }
        serializer.submit(JobKind::Uninterruptible, |log: &Mutex<Vec<&'static str>>, _| {
            log.lock().push("replace");
            Ok(())
        });

        serializer.interrupt_pending();
        gate_tx.send(()).unwrap();

        let log = serializer
            .call(JobKind::Cancellable, |log, _| Ok(log.lock().clone()), None)
            .unwrap();

        assert_eq!(log, vec!["replace"]);
        assert_eq!(callbacks.load(Ordering::SeqCst), 0);
        assert_eq!(serializer.stats().dropped, 2);
        serializer.stop().unwrap();
    }

    #[test]
    fn test_dropped_blocking_call_returns_dropped() {
        let serializer = Arc::new(started(()));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();

        serializer.submit(JobKind::Uninterruptible, move |_, _| {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
            Ok(())
        });
        started_rx.recv().unwrap();

        let caller = {
            let serializer = Arc::clone(&serializer);
            thread::spawn(move || serializer.call(JobKind::Cancellable, |_, _| Ok(1), None))
        };

        // wait until the blocking call is queued behind the gate
        let deadline = Instant::now() + Duration::from_secs(5);
        while serializer.stats().submitted < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        serializer.interrupt_pending();
        gate_tx.send(()).unwrap();

        assert!(matches!(caller.join().unwrap(), Err(Error::Dropped)));
        serializer.stop().unwrap();
    }

    #[test]
    fn test_stop_runs_everything_queued() {
        let serializer = started(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();

        for i in 0..5 {
            serializer.submit(JobKind::Uninterruptible, move |log: &Mutex<Vec<i32>>, _| {
                thread::sleep(Duration::from_millis(5));
                log.lock().push(i);
                Ok(())
            });
        }
        serializer.submit(JobKind::Uninterruptible, move |log: &Mutex<Vec<i32>>, _| {
            tx.send(log.lock().clone()).unwrap();
            Ok(())
        });

        serializer.stop().unwrap();
        assert!(!serializer.is_running());
        assert_eq!(rx.try_recv().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(serializer.stats().completed, 6);
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs(f: impl FnOnce()) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, f);
        String::from_utf8_lossy(&capture.0.lock()).to_string()
    }

    #[test]
    fn test_drop_while_running_warns() {
        let logs = capture_logs(|| {
            let serializer = started(());
            serializer.submit(JobKind::Uninterruptible, |_, _| Ok(()));
            drop(serializer);
        });
        assert!(logs.contains("dropped while running"), "logs: {logs}");
    }

    #[test]
    fn test_background_drop_is_silent() {
        let logs = capture_logs(|| {
            let serializer = Serializer::new("zem-test", ()).background(true);
            serializer.start().unwrap();
            drop(serializer);
        });
        assert!(!logs.contains("dropped while running"), "logs: {logs}");
    }

    #[test]
    fn test_never_started_drop_runs_queue_and_warns() {
        let ran = Arc::new(AtomicUsize::new(0));
        let logs = capture_logs(|| {
            let serializer = Serializer::new("zem-test", ());
            let ran = Arc::clone(&ran);
            serializer.submit(JobKind::Uninterruptible, move |_, _| {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            drop(serializer);
        });

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(logs.contains("jobs queued before start"), "logs: {logs}");
    }

    #[test]
    fn test_never_started_empty_drop_is_silent() {
        let logs = capture_logs(|| drop(Serializer::new("zem-test", ())));
        assert!(!logs.contains("Execution serializer dropped"), "logs: {logs}");
    }

    #[test]
    fn test_stop_before_start_runs_accepted_jobs() {
        let serializer = Serializer::new("zem-test", Mutex::new(Vec::new()));
        for i in 0..3 {
            let seq = serializer.submit(JobKind::Uninterruptible, move |log: &Mutex<Vec<i32>>, _| {
                log.lock().push(i);
                Ok(())
            });
            assert!(seq.is_some());
        }

        serializer.stop().unwrap();
        assert!(!serializer.is_running());
        assert_eq!(*serializer.state.lock(), vec![0, 1, 2]);
        assert_eq!(serializer.stats().completed, 3);

        // a second stop is a no-op
        serializer.stop().unwrap();
    }

    #[test]
    fn test_submit_after_stop_requested_is_refused() {
        let serializer = Arc::new(started(()));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();

        serializer.submit(JobKind::Uninterruptible, move |_, _| {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
            Ok(())
        });
        started_rx.recv().unwrap();

        let stopper = {
            let serializer = Arc::clone(&serializer);
            thread::spawn(move || serializer.stop())
        };

        // the owner is still busy behind the gate while stop waits on it
        let deadline = Instant::now() + Duration::from_secs(5);
        while serializer.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let ran = Arc::new(AtomicUsize::new(0));
        let accepted = {
            let ran = Arc::clone(&ran);
            serializer.submit(JobKind::Uninterruptible, move |_, _| {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        gate_tx.send(()).unwrap();
        stopper.join().unwrap().unwrap();

        assert_eq!(accepted, None);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        let stats = serializer.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.dropped, 1);
    }
}
