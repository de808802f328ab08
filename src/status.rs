//! In-flight request tracking
//!
//! Every search, index run and eviction pass registers a `ThreadStatus` for its lifetime.
//! Entries carry progress, held locks and per-task timings. They feed the status page and
//! the message returned when a search times out.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Accumulated time and count per named task
#[derive(Debug, Default)]
pub struct TaskLog {
    current: Option<(String, Instant)>,
    totals: BTreeMap<String, (Duration, u32)>,
}

impl TaskLog {
    /// Close the running task (if any) and start `name`.
    pub fn start(&mut self, name: &str) {
        self.finish();
        self.current = Some((name.to_string(), Instant::now()));
    }

    fn finish(&mut self) {
        if let Some((name, started)) = self.current.take() {
            let entry = self.totals.entry(name).or_default();
            entry.0 += started.elapsed();
            entry.1 += 1;
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_ref().map(|(name, _)| name.as_str())
    }

    fn render(&self) -> String {
        let mut out = String::new();
        let mut entries: Vec<_> = self.totals.iter().collect();
        entries.sort_by(|a, b| b.1.0.cmp(&a.1.0));
        for (name, (duration, count)) in entries {
            let _ = writeln!(out, "    {name}: {count}x {:.3}s", duration.as_secs_f64());
        }
        if let Some((name, started)) = &self.current {
            let _ = writeln!(out, "    {name}: running for {:.3}s", started.elapsed().as_secs_f64());
        }
        out
    }
}

#[derive(Debug, Default)]
struct ThreadState {
    indexed: usize,
    total: usize,
    held_locks: BTreeSet<String>,
    tasklog: TaskLog,
}

/// Status of one in-flight request
#[derive(Debug)]
pub struct ThreadStatus {
    pub id: u64,
    pub name: String,
    pub repo: Option<String>,
    started: Instant,
    started_at: DateTime<Utc>,
    state: Mutex<ThreadState>,
}

impl ThreadStatus {
    pub fn set_progress(&self, indexed: usize, total: usize) {
        let mut state = self.state.lock();
        state.indexed = indexed;
        state.total = total;
    }

    pub fn hold_lock(&self, name: &str) {
        self.state.lock().held_locks.insert(name.to_string());
    }

    pub fn release_lock(&self, name: &str) {
        self.state.lock().held_locks.remove(name);
    }

    pub fn held_locks(&self) -> Vec<String> {
        self.state.lock().held_locks.iter().cloned().collect()
    }

    /// Record the start of a named step
    pub fn task(&self, name: &str) {
        self.state.lock().tasklog.start(name);
    }

    pub fn progress(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.indexed, state.total)
    }

    /// Estimated time until `total` is reached, from the rate so far
    pub fn eta(&self) -> Option<Duration> {
        let (indexed, total) = self.progress();
        if indexed == 0 || total <= indexed {
            return None;
        }
        let per_item = self.started.elapsed().as_secs_f64() / indexed as f64;
        Some(Duration::from_secs_f64(per_item * (total - indexed) as f64))
    }

    /// One-line summary, used in timeout messages
    pub fn describe(&self) -> String {
        let (indexed, total) = self.progress();
        let mut line = self.name.clone();
        if total > 0 {
            let percent = indexed * 100 / total;
            let _ = write!(line, " {indexed} of {total} commits ({percent}%)");
            if let Some(eta) = self.eta() {
                let _ = write!(line, ", ETA {}s", eta.as_secs());
            }
        }
        let state = self.state.lock();
        if let Some(task) = state.tasklog.current() {
            let _ = write!(line, ", {task}");
        }
        line
    }

    fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} (started {}, {:.1}s ago)",
            self.describe(),
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.started.elapsed().as_secs_f64()
        );
        let state = self.state.lock();
        if !state.held_locks.is_empty() {
            let locks: Vec<_> = state.held_locks.iter().cloned().collect();
            let _ = writeln!(out, "  holding {}", locks.join(", "));
        }
        out.push_str(&state.tasklog.render());
        out
    }
}

/// Registry of in-flight requests
#[derive(Debug, Default)]
pub struct StatusRegistry {
    next_id: AtomicU64,
    threads: Mutex<BTreeMap<u64, Arc<ThreadStatus>>>,
}

impl StatusRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a request; it is removed when the returned handle drops.
    pub fn start(self: &Arc<Self>, name: impl Into<String>, repo: Option<&str>) -> StatusHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let status = Arc::new(ThreadStatus {
            id,
            name: name.into(),
            repo: repo.map(str::to_string),
            started: Instant::now(),
            started_at: Utc::now(),
            state: Mutex::new(ThreadState::default()),
        });
        self.threads.lock().insert(id, status.clone());
        StatusHandle {
            registry: self.clone(),
            status,
        }
    }

    /// Summaries of every in-flight entry for `repo` other than `skip`
    pub fn repo_status(&self, repo: &str, skip: Option<u64>) -> Vec<String> {
        self.threads
            .lock()
            .values()
            .filter(|status| status.repo.as_deref() == Some(repo) && Some(status.id) != skip)
            .map(|status| status.describe())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable dump of every in-flight entry
    pub fn render(&self) -> String {
        let threads: Vec<_> = self.threads.lock().values().cloned().collect();
        let mut out = String::new();
        let _ = writeln!(out, "In-flight requests: {}", threads.len());
        for status in threads {
            out.push('\n');
            out.push_str(&status.render());
        }
        out
    }
}

/// Keeps a `ThreadStatus` registered until dropped
pub struct StatusHandle {
    registry: Arc<StatusRegistry>,
    status: Arc<ThreadStatus>,
}

impl StatusHandle {
    pub fn status(&self) -> &Arc<ThreadStatus> {
        &self.status
    }
}

impl Deref for StatusHandle {
    type Target = ThreadStatus;

    fn deref(&self) -> &ThreadStatus {
        &self.status
    }
}

impl Drop for StatusHandle {
    fn drop(&mut self) {
        self.registry.threads.lock().remove(&self.status.id);
    }
}
