use crate::error::{ErrorKind, Result};
use crate::task::{BoxTask, Progress};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::instrument;

/// Snapshot of one group's queues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub waiting: usize,
    pub pending: usize,
    pub completed: usize,
    pub errored: usize,
    /// Bytes reported by completed tasks plus those still running
    pub bytes: u64,
}

/// A task that errored, as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub group: &'static str,
    pub description: String,
    pub message: String,
}

struct Job {
    id: u64,
    task: BoxTask,
}

/// What travels down a group's channel.
enum Dispatch {
    Run(Job),
    Stop,
}

/// What workers tell the supervisor.
enum Event {
    Started { id: u64, group: &'static str, progress: Progress },
    Completed { id: u64, next: Option<BoxTask> },
    Failed { id: u64, task: BoxTask, message: String },
    Stop,
}

struct Pending {
    group: &'static str,
    progress: Progress,
}

struct Errored {
    task: BoxTask,
    failure: Failure,
}

/// Counters only; the tasks themselves live in the channels.
#[derive(Default)]
struct Ledger {
    running: bool,
    waiting: BTreeMap<&'static str, usize>,
    pending: BTreeMap<u64, Pending>,
    /// Count and bytes of completed tasks, by group
    completed: BTreeMap<&'static str, (usize, u64)>,
    errors: Vec<Errored>,
    next_id: u64,
}

impl Ledger {
    fn drained(&self) -> bool {
        self.pending.is_empty() && self.waiting.values().all(|count| *count == 0)
    }
}

struct Shared {
    ledger: Mutex<Ledger>,
    drained: Condvar,
    senders: BTreeMap<&'static str, Sender<Dispatch>>,
    stopping: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Ledger> {
        // Tasks never run under the lock, so poisoning can only come from
        // the queue's own bookkeeping; the counters are still consistent.
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a task down its group's channel. Hands the task back when the
    /// group is unknown.
    fn submit(&self, ledger: &mut Ledger, task: BoxTask) -> std::result::Result<(), BoxTask> {
        let group = task.group();
        let Some(sender) = self.senders.get(group) else {
            return Err(task);
        };
        let id = ledger.next_id;
        match sender.send(Dispatch::Run(Job { id, task })) {
            Ok(()) => {
                ledger.next_id += 1;
                *ledger.waiting.entry(group).or_default() += 1;
                Ok(())
            },
            Err(mpsc::SendError(Dispatch::Run(job))) => Err(job.task),
            // Only `Run` is ever sent here.
            Err(mpsc::SendError(Dispatch::Stop)) => Ok(()),
        }
    }

    fn record(&self, event: Event) {
        let mut ledger = self.lock();
        match event {
            Event::Started { id, group, progress } => {
                if let Some(waiting) = ledger.waiting.get_mut(group) {
                    *waiting = waiting.saturating_sub(1);
                }
                ledger.pending.insert(id, Pending { group, progress });
            },
            Event::Completed { id, next } => {
                if let Some(pending) = ledger.pending.remove(&id) {
                    let entry = ledger.completed.entry(pending.group).or_default();
                    entry.0 += 1;
                    entry.1 += pending.progress.get();
                }
                if let Some(next) = next
                    && let Err(next) = self.submit(&mut ledger, next)
                {
                    let failure = Failure {
                        group: next.group(),
                        description: next.describe(),
                        message: ErrorKind::UnknownGroup(next.group().to_string()).to_string(),
                    };
                    tracing::error!(group = failure.group, task = %failure.description, "follow-up task has no workers");
                    ledger.errors.push(Errored { task: next, failure });
                }
            },
            Event::Failed { id, task, message } => {
                ledger.pending.remove(&id);
                let failure = Failure {
                    group: task.group(),
                    description: task.describe(),
                    message,
                };
                ledger.errors.push(Errored { task, failure });
            },
            Event::Stop => {},
        }
        if ledger.drained() {
            self.drained.notify_all();
        }
    }
}

struct Workers {
    threads: Vec<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

/// Worker pools, one per group, each fed by its own channel.
///
/// Every task is in exactly one of four places: waiting in its group's
/// channel, pending on a worker, completed, or errored. Workers report to a
/// supervisor thread over a second channel; the supervisor keeps the books
/// and forwards follow-up tasks into their group's channel. Errored tasks
/// are kept so the whole batch can be re-submitted with
/// [`requeue_errors`](Self::requeue_errors).
///
/// ```
/// use hoist_queue::{BoxTask, Progress, Task, WorkQueue};
///
/// struct Count(u64);
///
/// impl Task for Count {
///     fn group(&self) -> &'static str {
///         "count"
///     }
///
///     fn execute(&mut self, progress: &Progress) -> hoist_queue::error::Result<Option<BoxTask>> {
///         progress.set(self.0);
///         Ok(None)
///     }
///
///     fn describe(&self) -> String {
///         format!("count {}", self.0)
///     }
/// }
///
/// let queue = WorkQueue::new([("count", 2)]);
/// queue.start().unwrap();
/// for n in 1..=3 {
///     queue.enqueue(Box::new(Count(n))).unwrap();
/// }
/// queue.wait_for_finish();
/// assert_eq!(queue.stats()["count"].bytes, 6);
/// queue.shutdown();
/// ```
pub struct WorkQueue {
    shared: Arc<Shared>,
    groups: Vec<(&'static str, usize)>,
    receivers: BTreeMap<&'static str, Arc<Mutex<Receiver<Dispatch>>>>,
    events: Sender<Event>,
    supervisor_events: Mutex<Option<Receiver<Event>>>,
    workers: Mutex<Workers>,
}

impl WorkQueue {
    /// A queue with `workers` threads for each named group.
    pub fn new(groups: impl IntoIterator<Item = (&'static str, usize)>) -> Self {
        let groups: Vec<_> = groups.into_iter().collect();
        let mut senders = BTreeMap::new();
        let mut receivers = BTreeMap::new();
        for (group, _) in &groups {
            let (sender, receiver) = mpsc::channel();
            senders.insert(*group, sender);
            receivers.insert(*group, Arc::new(Mutex::new(receiver)));
        }
        let (events, supervisor_events) = mpsc::channel();
        let ledger = Ledger {
            waiting: groups.iter().map(|(group, _)| (*group, 0)).collect(),
            ..Default::default()
        };
        Self {
            shared: Arc::new(Shared {
                ledger: Mutex::new(ledger),
                drained: Condvar::new(),
                senders,
                stopping: AtomicBool::new(false),
            }),
            groups,
            receivers,
            events,
            supervisor_events: Mutex::new(Some(supervisor_events)),
            workers: Mutex::new(Workers {
                threads: Vec::new(),
                supervisor: None,
            }),
        }
    }

    /// Spawn the supervisor and the worker threads.
    ///
    /// Starting twice is a no-op.
    #[instrument(skip_all)]
    pub fn start(&self) -> Result<()> {
        let Some(events) = self.supervisor_events.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            tracing::debug!("queue already started");
            return Ok(());
        };
        self.shared.lock().running = true;
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        let shared = Arc::clone(&self.shared);
        let supervisor = thread::Builder::new()
            .name("queue-supervisor".to_string())
            .spawn(move || supervise(&shared, &events))
            .map_err(ErrorKind::Io)?;
        workers.supervisor = Some(supervisor);
        for (group, count) in &self.groups {
            let group = *group;
            let Some(receiver) = self.receivers.get(group) else {
                continue;
            };
            for _ in 0..*count {
                let receiver = Arc::clone(receiver);
                let events = self.events.clone();
                let shared = Arc::clone(&self.shared);
                let handle = thread::Builder::new()
                    .name(format!("{group}-worker"))
                    .spawn(move || work(&receiver, &events, &shared.stopping, group))
                    .map_err(ErrorKind::Io)?;
                workers.threads.push(handle);
            }
            tracing::debug!(group, workers = count, "started workers");
        }
        Ok(())
    }

    pub fn enqueue(&self, task: BoxTask) -> Result<()> {
        let mut ledger = self.shared.lock();
        if let Err(task) = self.shared.submit(&mut ledger, task) {
            exn::bail!(ErrorKind::UnknownGroup(task.group().to_string()));
        }
        Ok(())
    }

    /// Block until nothing is waiting or pending in any group.
    ///
    /// Returns immediately when the queue isn't running.
    pub fn wait_for_finish(&self) {
        let mut ledger = self.shared.lock();
        while ledger.running && !ledger.drained() {
            ledger = self.shared.drained.wait(ledger).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.shared.lock().errors.is_empty()
    }

    pub fn errors(&self) -> Vec<Failure> {
        self.shared.lock().errors.iter().map(|errored| errored.failure.clone()).collect()
    }

    /// Re-submit every errored task to its group.
    ///
    /// Returns how many tasks were requeued.
    pub fn requeue_errors(&self) -> usize {
        let mut ledger = self.shared.lock();
        let errors = std::mem::take(&mut ledger.errors);
        let mut count = 0;
        for errored in errors {
            match self.shared.submit(&mut ledger, errored.task) {
                Ok(()) => count += 1,
                Err(task) => ledger.errors.push(Errored {
                    task,
                    failure: errored.failure,
                }),
            }
        }
        tracing::debug!(count, "requeued errored tasks");
        count
    }

    pub fn stats(&self) -> BTreeMap<&'static str, GroupStats> {
        let ledger = self.shared.lock();
        let mut stats: BTreeMap<&'static str, GroupStats> =
            self.groups.iter().map(|(group, _)| (*group, GroupStats::default())).collect();
        for (group, waiting) in &ledger.waiting {
            stats.entry(*group).or_default().waiting = *waiting;
        }
        for pending in ledger.pending.values() {
            let entry = stats.entry(pending.group).or_default();
            entry.pending += 1;
            entry.bytes += pending.progress.get();
        }
        for (group, (count, bytes)) in &ledger.completed {
            let entry = stats.entry(*group).or_default();
            entry.completed = *count;
            entry.bytes += bytes;
        }
        for errored in &ledger.errors {
            stats.entry(errored.failure.group).or_default().errored += 1;
        }
        stats
    }

    /// Stop taking new work, wake idle workers and join every thread.
    ///
    /// Tasks already executing are allowed to finish; anything still
    /// waiting in a channel is dropped.
    #[instrument(skip_all)]
    pub fn shutdown(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        {
            let mut ledger = self.shared.lock();
            ledger.running = false;
            self.shared.drained.notify_all();
        }
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for (group, count) in &self.groups {
            if let Some(sender) = self.shared.senders.get(group) {
                for _ in 0..*count {
                    // Fails only once every worker of the group is gone.
                    let _ = sender.send(Dispatch::Stop);
                }
            }
        }
        for handle in workers.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("worker thread panicked");
            }
        }
        if let Some(supervisor) = workers.supervisor.take() {
            let _ = self.events.send(Event::Stop);
            if supervisor.join().is_err() {
                tracing::warn!("queue supervisor panicked");
            }
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn supervise(shared: &Shared, events: &Receiver<Event>) {
    while let Ok(event) = events.recv() {
        if matches!(event, Event::Stop) {
            break;
        }
        shared.record(event);
    }
}

fn work(receiver: &Mutex<Receiver<Dispatch>>, events: &Sender<Event>, stopping: &AtomicBool, group: &'static str) {
    loop {
        let message = receiver.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(Dispatch::Run(Job { id, mut task })) = message else {
            break;
        };
        if stopping.load(Ordering::Acquire) {
            break;
        }
        let progress = Progress::default();
        let started = Event::Started {
            id,
            group,
            progress: progress.clone(),
        };
        if events.send(started).is_err() {
            break;
        }
        let description = task.describe();
        let _span = tracing::debug_span!("task", group, task = %description).entered();
        let event = match panic::catch_unwind(AssertUnwindSafe(|| task.execute(&progress))) {
            Ok(Ok(next)) => Event::Completed { id, next },
            Ok(Err(err)) => {
                tracing::error!(error = ?err, "task failed");
                Event::Failed {
                    id,
                    task,
                    message: err.to_string(),
                }
            },
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(message = %message, "task panicked");
                Event::Failed {
                    id,
                    task,
                    message: ErrorKind::Panicked(description, message).to_string(),
                }
            },
        };
        if events.send(event).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    payload.downcast_ref::<String>().cloned().unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Task;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fails (or panics) until `healed` is set.
    struct Flaky {
        n: u64,
        fail: bool,
        panic: bool,
        healed: Arc<AtomicBool>,
        runs: Arc<AtomicUsize>,
    }

    impl Task for Flaky {
        fn group(&self) -> &'static str {
            "work"
        }

        fn execute(&mut self, progress: &Progress) -> Result<Option<BoxTask>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail && !self.healed.load(Ordering::SeqCst) {
                if self.panic {
                    panic!("boom {}", self.n);
                }
                exn::bail!(ErrorKind::Task(self.describe()));
            }
            progress.set(self.n);
            Ok(None)
        }

        fn describe(&self) -> String {
            format!("flaky {}", self.n)
        }
    }

    /// Records its upload into `log` once executed.
    struct Stage {
        name: String,
        upload: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Task for Stage {
        fn group(&self) -> &'static str {
            if self.upload { "upload" } else { "packfile" }
        }

        fn execute(&mut self, _progress: &Progress) -> Result<Option<BoxTask>> {
            self.log.lock().unwrap().push(self.describe());
            if self.upload {
                return Ok(None);
            }
            Ok(Some(Box::new(Stage {
                name: self.name.clone(),
                upload: true,
                log: self.log.clone(),
            })))
        }

        fn describe(&self) -> String {
            format!("{} {}", self.group(), self.name)
        }
    }

    fn flaky_batch(queue: &WorkQueue, total: u64, failing: u64, panic: bool) -> (Arc<AtomicBool>, Arc<AtomicUsize>) {
        let healed = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(AtomicUsize::new(0));
        for n in 0..total {
            queue
                .enqueue(Box::new(Flaky {
                    n,
                    fail: n < failing,
                    panic,
                    healed: healed.clone(),
                    runs: runs.clone(),
                }))
                .unwrap();
        }
        (healed, runs)
    }

    #[test]
    fn test_drain_then_retry_errors() {
        let queue = WorkQueue::new([("work", 3)]);
        queue.start().unwrap();
        let (healed, runs) = flaky_batch(&queue, 10, 4, false);
        queue.wait_for_finish();

        let stats = queue.stats()["work"];
        assert_eq!(stats.completed, 6);
        assert_eq!(stats.errored, 4);
        assert_eq!(queue.errors().len(), 4);

        healed.store(true, Ordering::SeqCst);
        assert_eq!(queue.requeue_errors(), 4);
        queue.wait_for_finish();
        let stats = queue.stats()["work"];
        assert_eq!(stats.completed, 10);
        assert_eq!(stats.errored, 0);
        assert!(!queue.has_errors());
        assert_eq!(runs.load(Ordering::SeqCst), 14);
        assert_eq!(stats.bytes, (0..10).sum::<u64>());
        queue.shutdown();
    }

    #[test]
    fn test_panics_are_errors() {
        let queue = WorkQueue::new([("work", 2)]);
        queue.start().unwrap();
        flaky_batch(&queue, 3, 1, true);
        queue.wait_for_finish();
        let errors = queue.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].description, "flaky 0");
        assert!(errors[0].message.contains("boom 0"), "{}", errors[0].message);
        assert_eq!(queue.stats()["work"].completed, 2);
    }

    #[test]
    fn test_follow_up_runs_after_completion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queue = WorkQueue::new([("packfile", 2), ("upload", 1)]);
        queue.start().unwrap();
        for name in ["a", "b", "c"] {
            queue
                .enqueue(Box::new(Stage {
                    name: name.to_string(),
                    upload: false,
                    log: log.clone(),
                }))
                .unwrap();
        }
        queue.wait_for_finish();
        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 6);
        for name in ["a", "b", "c"] {
            let packed = log.iter().position(|entry| *entry == format!("packfile {name}")).unwrap();
            let uploaded = log.iter().position(|entry| *entry == format!("upload {name}")).unwrap();
            assert!(packed < uploaded);
        }
        let stats = queue.stats();
        assert_eq!(stats["packfile"].completed, 3);
        assert_eq!(stats["upload"].completed, 3);
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let queue = WorkQueue::new([("upload", 1)]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = queue
            .enqueue(Box::new(Stage {
                name: "x".to_string(),
                upload: false,
                log,
            }))
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownGroup(group) if group == "packfile"));
    }

    #[test]
    fn test_wait_without_start_returns() {
        let queue = WorkQueue::new([("work", 1)]);
        flaky_batch(&queue, 2, 0, false);
        queue.wait_for_finish();
        assert_eq!(queue.stats()["work"].waiting, 2);
    }
}
