//! Single-threaded execution lanes.
//!
//! Each lane is one named thread draining a crossbeam channel. Work pinned to
//! a lane never runs concurrently with itself. Delayed runs wait in a
//! deadline heap on the lane; when a task is scheduled twice the earlier
//! deadline wins.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use ordo_core::ContextId;

/// Work that runs on a lane.
pub trait LaneTask: Send + Sync + 'static {
    fn run_on_lane(self: Arc<Self>);
}

enum LaneMsg {
    Run {
        task: Arc<dyn LaneTask>,
        delay: Duration,
    },
    Shutdown,
}

/// Handle for queueing work onto one lane.
#[derive(Clone)]
pub struct LaneHandle {
    index: usize,
    tx: Sender<LaneMsg>,
}

impl LaneHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Queue `task` to run after `delay`. Returns false if the lane is gone.
    pub fn schedule(&self, task: Arc<dyn LaneTask>, delay: Duration) -> bool {
        self.tx.send(LaneMsg::Run { task, delay }).is_ok()
    }
}

impl std::fmt::Debug for LaneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LaneHandle({})", self.index)
    }
}

pub struct LanePool {
    lanes: Vec<LaneHandle>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl LanePool {
    /// Spawn lanes. `parallelism` is rounded up to the next prime so contexts
    /// spread evenly by hash.
    pub fn new(parallelism: usize, name_prefix: &str) -> std::io::Result<Self> {
        let count = lane_count(parallelism);
        let mut lanes = Vec::with_capacity(count);
        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let (tx, rx) = crossbeam::channel::unbounded();
            let handle = std::thread::Builder::new()
                .name(format!("{name_prefix}-{index}"))
                .spawn(move || run_lane(index, rx))?;
            lanes.push(LaneHandle { index, tx });
            threads.push(handle);
        }
        tracing::debug!(lanes = count, "lane pool started");
        Ok(Self {
            lanes,
            threads: Mutex::new(threads),
        })
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// The lane `context` is pinned to. Stable for the life of the pool.
    pub fn lane_for(&self, context: &ContextId) -> LaneHandle {
        let index = (fnv1a(context.as_str().as_bytes()) % self.lanes.len() as u64) as usize;
        self.lanes[index].clone()
    }

    /// Stop every lane and wait for it. Delayed runs still queued are dropped.
    pub fn shutdown(&self) {
        for lane in &self.lanes {
            let _ = lane.tx.send(LaneMsg::Shutdown);
        }
        let threads = std::mem::take(&mut *self.threads.lock().expect("lane threads poisoned"));
        for handle in threads {
            if handle.join().is_err() {
                tracing::error!("lane thread panicked during shutdown");
            }
        }
    }
}

impl Drop for LanePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lane_count(parallelism: usize) -> usize {
    if parallelism <= 1 {
        return 1;
    }
    (parallelism..)
        .find(|&n| is_prime(n))
        .unwrap_or(parallelism)
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn run_lane(index: usize, rx: Receiver<LaneMsg>) {
    let mut schedule = LaneSchedule::default();
    loop {
        let msg = match schedule.next_deadline() {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match msg {
            Ok(LaneMsg::Run { task, delay }) if delay.is_zero() => run_task(index, task),
            Ok(LaneMsg::Run { task, delay }) => schedule.schedule_at(task, Instant::now() + delay),
            Ok(LaneMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        for task in schedule.drain_due(Instant::now()) {
            run_task(index, task);
        }
    }
    tracing::debug!(lane = index, "lane stopped");
}

fn run_task(index: usize, task: Arc<dyn LaneTask>) {
    let _span = tracing::debug_span!("lane", lane = index).entered();
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| task.run_on_lane())) {
        tracing::error!(
            lane = index,
            panic = %panic_message(panic.as_ref()),
            "lane task panicked"
        );
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

type TaskKey = usize;

fn task_key(task: &Arc<dyn LaneTask>) -> TaskKey {
    Arc::as_ptr(task) as *const () as usize
}

/// Delayed runs waiting on one lane.
#[derive(Default)]
struct LaneSchedule {
    pending: HashMap<TaskKey, (Instant, Arc<dyn LaneTask>)>,
    /// May hold stale entries; they are discarded by checking `pending`.
    heap: BinaryHeap<Reverse<(Instant, TaskKey)>>,
}

impl LaneSchedule {
    fn schedule_at(&mut self, task: Arc<dyn LaneTask>, fire_at: Instant) {
        let key = task_key(&task);
        if let Some((existing, _)) = self.pending.get(&key)
            && *existing <= fire_at
        {
            return;
        }
        self.pending.insert(key, (fire_at, task));
        self.heap.push(Reverse((fire_at, key)));
    }

    fn next_deadline(&mut self) -> Option<Instant> {
        self.pop_stale();
        self.heap.peek().map(|Reverse((fire_at, _))| *fire_at)
    }

    fn drain_due(&mut self, now: Instant) -> Vec<Arc<dyn LaneTask>> {
        let mut due = Vec::new();
        loop {
            self.pop_stale();
            let Some(Reverse((fire_at, key))) = self.heap.peek().copied() else {
                break;
            };
            if fire_at > now {
                break;
            }
            let _ = self.heap.pop();
            if let Some((_, task)) = self.pending.remove(&key) {
                due.push(task);
            }
        }
        due
    }

    fn pop_stale(&mut self) {
        while let Some(Reverse((fire_at, key))) = self.heap.peek() {
            match self.pending.get(key) {
                Some((current, _)) if current == fire_at => break,
                _ => {
                    let _ = self.heap.pop();
                }
            }
        }
    }
}
