//! Run store — durable run records plus the append-only activity log.
//!
//! In-memory state is a bounded map of recent runs (each with its full
//! activity history) behind a `parking_lot::RwLock`; persistence is JSONL:
//! one snapshot line per run status change in `runs.jsonl`, one line per
//! activity in `activities/{run_id}.jsonl`. `seq` is allocated atomically
//! under the store write lock, which also serializes the disk append, so
//! the per-run log is gap-free and totally ordered.
//!
//! Every append fans out to the run's `tokio::sync::broadcast` channel;
//! the SSE surface subscribes there and replays history from this store.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use ds_domain::activity::{run_failed_payload, Activity, ActivityKind};
use ds_domain::mode::Mode;
use ds_domain::run::{Run, RunMetadata, RunStatus};
use ds_domain::{Error, Result};

const MAX_RUNS_IN_MEMORY: usize = 2000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Returned by [`RunStore::create_run`] when the id already exists.
#[derive(Debug)]
pub struct DuplicateRunId;

impl std::fmt::Display for DuplicateRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a run with this id already exists")
    }
}

impl std::error::Error for DuplicateRunId {}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interior state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct RunEntry {
    run: Run,
    activities: Vec<Activity>,
}

struct StoreInner {
    entries: HashMap<Uuid, RunEntry>,
    /// Creation order, oldest first. Used for eviction and listing.
    order: VecDeque<Uuid>,
}

impl StoreInner {
    fn next_seq(&self, run_id: &Uuid) -> Option<u64> {
        let entry = self.entries.get(run_id)?;
        Some(entry.activities.last().map(|a| a.seq).unwrap_or(0) + 1)
    }

    /// Evict the oldest terminal runs once over capacity. Live runs are
    /// never evicted — their activity history must stay appendable.
    fn evict_overflow(&mut self) {
        while self.entries.len() > MAX_RUNS_IN_MEMORY {
            let Some(pos) = self
                .order
                .iter()
                .position(|id| {
                    self.entries
                        .get(id)
                        .map(|e| e.run.status.is_terminal())
                        .unwrap_or(true)
                })
            else {
                tracing::warn!("run store over capacity with no terminal runs to evict");
                return;
            };
            if let Some(id) = self.order.remove(pos) {
                self.entries.remove(&id);
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RunStore {
    inner: RwLock<StoreInner>,
    runs_log: PathBuf,
    activities_dir: PathBuf,
    /// Per-run broadcast channels for the SSE fan-out.
    channels: RwLock<HashMap<Uuid, broadcast::Sender<Activity>>>,
    /// Bounded per-subscriber buffer; a lagging subscriber is dropped by
    /// the delivery surface.
    buffer: usize,
}

impl RunStore {
    /// Open (or create) the store under `state_path`, reloading persisted
    /// runs. Runs found non-terminal on disk crashed with the previous
    /// process; they are transitioned to `failed` and gain a terminal
    /// `run.failed` activity so the log invariants hold for readers.
    pub fn open(state_path: &Path, buffer: usize) -> Result<Self> {
        let activities_dir = state_path.join("activities");
        std::fs::create_dir_all(&activities_dir)?;
        let runs_log = state_path.join("runs.jsonl");

        let (entries, order, on_disk_lines) = Self::load(&runs_log, &activities_dir);

        let store = Self {
            inner: RwLock::new(StoreInner { entries, order }),
            runs_log,
            activities_dir,
            channels: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        };

        if on_disk_lines > store.inner.read().entries.len() * 2 {
            store.compact_runs_log();
        }

        store.recover_crashed_runs()?;
        Ok(store)
    }

    fn load(
        runs_log: &Path,
        activities_dir: &Path,
    ) -> (HashMap<Uuid, RunEntry>, VecDeque<Uuid>, usize) {
        let mut latest: HashMap<Uuid, Run> = HashMap::new();
        let mut lines = 0;
        if let Ok(content) = std::fs::read_to_string(runs_log) {
            for line in content.lines() {
                lines += 1;
                if let Ok(run) = serde_json::from_str::<Run>(line) {
                    // Last snapshot per run wins.
                    latest.insert(run.id, run);
                }
            }
        }

        let mut runs: Vec<Run> = latest.into_values().collect();
        runs.sort_by_key(|r| r.created_at);
        if runs.len() > MAX_RUNS_IN_MEMORY {
            runs.drain(..runs.len() - MAX_RUNS_IN_MEMORY);
        }

        let mut entries = HashMap::with_capacity(runs.len());
        let mut order = VecDeque::with_capacity(runs.len());
        for run in runs {
            let activities = Self::load_activities(activities_dir, run.id);
            order.push_back(run.id);
            entries.insert(run.id, RunEntry { run, activities });
        }
        (entries, order, lines)
    }

    fn load_activities(dir: &Path, run_id: Uuid) -> Vec<Activity> {
        let path = dir.join(format!("{run_id}.jsonl"));
        let mut activities = Vec::new();
        if let Ok(content) = std::fs::read_to_string(path) {
            for line in content.lines() {
                if let Ok(a) = serde_json::from_str::<Activity>(line) {
                    activities.push(a);
                }
            }
        }
        activities.sort_by_key(|a| a.seq);
        activities
    }

    fn recover_crashed_runs(&self) -> Result<()> {
        let crashed: Vec<Uuid> = {
            let inner = self.inner.read();
            inner
                .entries
                .values()
                .filter(|e| !e.run.status.is_terminal())
                .map(|e| e.run.id)
                .collect()
        };
        for run_id in crashed {
            tracing::warn!(run_id = %run_id, "marking crashed run as failed");
            self.update_status(
                run_id,
                RunStatus::Failed,
                Some((
                    "internal".into(),
                    "process terminated while the run was in flight".into(),
                )),
            )?;
            self.append_activity(
                run_id,
                ActivityKind::RunFailed,
                run_failed_payload("internal", "process terminated while the run was in flight"),
            )?;
        }
        Ok(())
    }

    /// Rewrite `runs.jsonl` with one snapshot per retained run.
    fn compact_runs_log(&self) {
        let inner = self.inner.read();
        let tmp = self.runs_log.with_extension("jsonl.tmp");
        let mut ok = false;
        if let Ok(mut f) = std::fs::File::create(&tmp) {
            ok = true;
            for id in &inner.order {
                if let Some(entry) = inner.entries.get(id) {
                    if let Ok(json) = serde_json::to_string(&entry.run) {
                        if writeln!(f, "{json}").is_err() {
                            ok = false;
                            break;
                        }
                    }
                }
            }
        }
        if ok {
            let _ = std::fs::rename(&tmp, &self.runs_log);
        } else {
            let _ = std::fs::remove_file(&tmp);
        }
    }

    fn persist_snapshot(&self, run: &Run) -> Result<()> {
        let json = serde_json::to_string(run)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.runs_log)?;
        writeln!(file, "{json}")?;
        Ok(())
    }

    fn persist_activity(&self, activity: &Activity) -> Result<()> {
        let json = serde_json::to_string(activity)?;
        let path = self
            .activities_dir
            .join(format!("{}.jsonl", activity.run_id));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{json}")?;
        Ok(())
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Insert a new run. The snapshot is persisted immediately so a crash
    /// before the first status change is still observable after restart.
    pub fn create_run(&self, run: Run) -> std::result::Result<(), DuplicateRunId> {
        {
            let mut inner = self.inner.write();
            if inner.entries.contains_key(&run.id) {
                return Err(DuplicateRunId);
            }
            if let Err(e) = self.persist_snapshot(&run) {
                tracing::warn!(run_id = %run.id, error = %e, "failed to persist run snapshot");
            }
            inner.order.push_back(run.id);
            inner.entries.insert(
                run.id,
                RunEntry {
                    run,
                    activities: Vec::new(),
                },
            );
            inner.evict_overflow();
        }
        Ok(())
    }

    /// Transition a run's status, enforcing the forward-only state
    /// machine. Terminal transitions set `completed_at` and persist a
    /// snapshot.
    pub fn update_status(
        &self,
        run_id: Uuid,
        new_status: RunStatus,
        error: Option<(String, String)>,
    ) -> Result<()> {
        let snapshot = {
            let mut inner = self.inner.write();
            let entry = inner
                .entries
                .get_mut(&run_id)
                .ok_or_else(|| Error::Store(format!("unknown run {run_id}")))?;
            if !entry.run.status.can_transition_to(new_status) {
                return Err(Error::Store(format!(
                    "illegal status transition {:?} -> {:?}",
                    entry.run.status, new_status
                )));
            }
            entry.run.status = new_status;
            entry.run.updated_at = Utc::now();
            if let Some((kind, message)) = error {
                entry.run.error_kind = Some(kind);
                entry.run.error_message = Some(message);
            }
            if new_status.is_terminal() {
                entry.run.completed_at = Some(Utc::now());
                Some(entry.run.clone())
            } else {
                None
            }
        };
        if let Some(run) = snapshot {
            self.persist_snapshot(&run)?;
        }
        Ok(())
    }

    /// Store the compiled artifact. The run manager calls this immediately
    /// before emitting `run.completed`.
    pub fn set_final_content(
        &self,
        run_id: Uuid,
        content: String,
        metadata: RunMetadata,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(&run_id)
            .ok_or_else(|| Error::Store(format!("unknown run {run_id}")))?;
        entry.run.final_content = Some(content);
        entry.run.metadata = metadata;
        entry.run.updated_at = Utc::now();
        Ok(())
    }

    /// Mutate non-status run fields (plan, findings, sources, chart
    /// artifacts) while the run is in flight. Engine-internal; status
    /// changes go through [`Self::update_status`] only.
    pub fn update_run<F>(&self, run_id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut Run),
    {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(&run_id) {
            Some(entry) => {
                f(&mut entry.run);
                entry.run.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Append one activity, allocating the next `seq` atomically. The
    /// in-memory push, the disk append, and the broadcast all happen under
    /// the write lock, so observers can never see reordered or duplicate
    /// seq values. Blocking here is the intended backpressure.
    pub fn append_activity(
        &self,
        run_id: Uuid,
        kind: ActivityKind,
        payload: serde_json::Value,
    ) -> Result<Activity> {
        let activity = {
            let mut inner = self.inner.write();
            let seq = inner
                .next_seq(&run_id)
                .ok_or_else(|| Error::Store(format!("unknown run {run_id}")))?;
            let activity = Activity {
                run_id,
                seq,
                kind,
                payload,
                timestamp: Utc::now(),
            };
            self.persist_activity(&activity)?;
            // Push only after the disk append succeeded; a failed append
            // must not leave a seq visible in memory but absent on disk.
            if let Some(entry) = inner.entries.get_mut(&run_id) {
                entry.activities.push(activity.clone());
            }
            activity
        };

        let channels = self.channels.read();
        if let Some(tx) = channels.get(&run_id) {
            let _ = tx.send(activity.clone());
        }
        Ok(activity)
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn get_run(&self, run_id: Uuid) -> Option<Run> {
        self.inner.read().entries.get(&run_id).map(|e| e.run.clone())
    }

    /// List runs newest-first with optional filters and pagination.
    /// Returns `(page, total_matches)`.
    pub fn list_runs(
        &self,
        user_id: Option<&str>,
        status: Option<RunStatus>,
        mode: Option<Mode>,
        limit: usize,
        offset: usize,
    ) -> (Vec<Run>, usize) {
        let inner = self.inner.read();
        let matches = |run: &Run| -> bool {
            user_id.map_or(true, |u| run.user_id == u)
                && status.map_or(true, |s| run.status == s)
                && mode.map_or(true, |m| run.mode == m)
        };

        let mut total = 0;
        let mut page = Vec::new();
        for id in inner.order.iter().rev() {
            let Some(entry) = inner.entries.get(id) else {
                continue;
            };
            if !matches(&entry.run) {
                continue;
            }
            if total >= offset && page.len() < limit {
                page.push(entry.run.clone());
            }
            total += 1;
        }
        (page, total)
    }

    /// Activities with `seq > since_seq`, ordered, up to `limit`.
    pub fn list_activities_since(
        &self,
        run_id: Uuid,
        since_seq: u64,
        limit: usize,
    ) -> Vec<Activity> {
        let inner = self.inner.read();
        match inner.entries.get(&run_id) {
            Some(entry) => entry
                .activities
                .iter()
                .filter(|a| a.seq > since_seq)
                .take(limit)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Activities with `low_seq <= seq` (and `seq <= high_seq` when given).
    pub fn list_activities_between(
        &self,
        run_id: Uuid,
        low_seq: u64,
        high_seq: Option<u64>,
    ) -> Vec<Activity> {
        let inner = self.inner.read();
        match inner.entries.get(&run_id) {
            Some(entry) => entry
                .activities
                .iter()
                .filter(|a| a.seq >= low_seq && high_seq.map_or(true, |h| a.seq <= h))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    // ── Fan-out ────────────────────────────────────────────────────

    /// Get or create the broadcast channel for a run.
    pub fn subscribe(&self, run_id: Uuid) -> broadcast::Receiver<Activity> {
        let mut channels = self.channels.write();
        let tx = channels
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(self.buffer).0);
        tx.subscribe()
    }

    /// Drop the broadcast channel once a run is terminal and drained.
    pub fn cleanup_channel(&self, run_id: Uuid) {
        self.channels.write().remove(&run_id);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use ds_domain::activity::{run_init_payload, run_progress_payload};
    use ds_domain::mode::Depth;
    use ds_domain::run::RunParams;

    fn test_run(user: &str) -> Run {
        Run::new(
            user,
            None,
            Mode::Research,
            "test goal",
            RunParams::default(),
            Vec::new(),
        )
    }

    fn open_store(dir: &Path) -> RunStore {
        RunStore::open(dir, 16).unwrap()
    }

    #[test]
    fn create_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let run = test_run("u1");
        let id = run.id;
        store.create_run(run).unwrap();

        let fetched = store.get_run(id).unwrap();
        assert_eq!(fetched.user_id, "u1");
        assert_eq!(fetched.status, RunStatus::Queued);
    }

    #[test]
    fn duplicate_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let run = test_run("u1");
        store.create_run(run.clone()).unwrap();
        assert!(store.create_run(run).is_err());
    }

    #[test]
    fn status_transitions_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let run = test_run("u1");
        let id = run.id;
        store.create_run(run).unwrap();

        store.update_status(id, RunStatus::Running, None).unwrap();
        store.update_status(id, RunStatus::Completed, None).unwrap();

        // Terminal is final.
        assert!(store.update_status(id, RunStatus::Failed, None).is_err());
        assert!(store.update_status(id, RunStatus::Running, None).is_err());
    }

    #[test]
    fn seq_is_contiguous_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let run = test_run("u1");
        let id = run.id;
        store.create_run(run).unwrap();

        for i in 0..5 {
            let a = store
                .append_activity(id, ActivityKind::RunProgress, run_progress_payload(i, 5))
                .unwrap();
            assert_eq!(a.seq, (i as u64) + 1);
        }

        let all = store.list_activities_since(id, 0, 100);
        let seqs: Vec<u64> = all.iter().map(|a| a.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn since_and_between_windows() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let run = test_run("u1");
        let id = run.id;
        store.create_run(run).unwrap();
        for i in 0..6 {
            store
                .append_activity(id, ActivityKind::RunProgress, run_progress_payload(i, 6))
                .unwrap();
        }

        let tail = store.list_activities_since(id, 4, 100);
        assert_eq!(tail.iter().map(|a| a.seq).collect::<Vec<_>>(), vec![5, 6]);

        let limited = store.list_activities_since(id, 0, 2);
        assert_eq!(limited.iter().map(|a| a.seq).collect::<Vec<_>>(), vec![1, 2]);

        let window = store.list_activities_between(id, 2, Some(4));
        assert_eq!(
            window.iter().map(|a| a.seq).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );

        let open_ended = store.list_activities_between(id, 5, None);
        assert_eq!(
            open_ended.iter().map(|a| a.seq).collect::<Vec<_>>(),
            vec![5, 6]
        );
    }

    #[test]
    fn reads_are_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let run = test_run("u1");
        let id = run.id;
        store.create_run(run).unwrap();
        for i in 0..3 {
            store
                .append_activity(id, ActivityKind::RunProgress, run_progress_payload(i, 3))
                .unwrap();
        }

        let first = store.list_activities_since(id, 0, 100);
        let second = store.list_activities_since(id, 0, 100);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.seq, b.seq);
            assert_eq!(a.kind, b.kind);
        }
    }

    #[test]
    fn broadcast_receives_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let run = test_run("u1");
        let id = run.id;
        store.create_run(run).unwrap();

        let mut rx = store.subscribe(id);
        store
            .append_activity(
                id,
                ActivityKind::RunInit,
                run_init_payload(Mode::Research, "g", Depth::Medium, &[], None),
            )
            .unwrap();

        let got = rx.try_recv().unwrap();
        assert_eq!(got.seq, 1);
        assert_eq!(got.kind, ActivityKind::RunInit);
    }

    #[test]
    fn persists_across_reopen_and_fails_crashed_runs() {
        let dir = tempfile::tempdir().unwrap();
        let id;
        {
            let store = open_store(dir.path());
            let run = test_run("u1");
            id = run.id;
            store.create_run(run).unwrap();
            store.update_status(id, RunStatus::Running, None).unwrap();
            store
                .append_activity(
                    id,
                    ActivityKind::RunInit,
                    run_init_payload(Mode::Research, "g", Depth::Medium, &[], None),
                )
                .unwrap();
            // Dropped while still running — simulated crash.
        }

        let store = open_store(dir.path());
        let run = store.get_run(id).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_kind.as_deref(), Some("internal"));

        // The recovered log ends with a terminal run.failed, gap-free.
        let activities = store.list_activities_since(id, 0, 100);
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].seq, 1);
        assert_eq!(activities[1].seq, 2);
        assert_eq!(activities[1].kind, ActivityKind::RunFailed);
    }

    #[test]
    fn completed_run_survives_reopen_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let id;
        {
            let store = open_store(dir.path());
            let run = test_run("u1");
            id = run.id;
            store.create_run(run).unwrap();
            store.update_status(id, RunStatus::Running, None).unwrap();
            store
                .set_final_content(id, "# Done".into(), RunMetadata::default())
                .unwrap();
            store.update_status(id, RunStatus::Completed, None).unwrap();
        }

        let store = open_store(dir.path());
        let run = store.get_run(id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.final_content.as_deref(), Some("# Done"));
    }

    #[test]
    fn list_runs_filters_and_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        for i in 0..5 {
            let user = if i % 2 == 0 { "alice" } else { "bob" };
            store.create_run(test_run(user)).unwrap();
        }

        let (alices, total) = store.list_runs(Some("alice"), None, None, 10, 0);
        assert_eq!(total, 3);
        assert!(alices.iter().all(|r| r.user_id == "alice"));

        let (page, total) = store.list_runs(None, None, None, 2, 2);
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);

        let (queued, _) = store.list_runs(None, Some(RunStatus::Queued), None, 10, 0);
        assert_eq!(queued.len(), 5);
        let (completed, _) = store.list_runs(None, Some(RunStatus::Completed), None, 10, 0);
        assert!(completed.is_empty());
    }

    #[test]
    fn append_to_unknown_run_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let err = store
            .append_activity(
                Uuid::new_v4(),
                ActivityKind::RunProgress,
                run_progress_payload(0, 1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn update_run_mutates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let run = test_run("u1");
        let id = run.id;
        store.create_run(run).unwrap();

        assert!(store.update_run(id, |r| {
            r.findings.push(ds_domain::run::Finding {
                text: "fact".into(),
                origin: ds_domain::run::FindingOrigin::WebSearch,
                source_ref: None,
            });
        }));
        assert_eq!(store.get_run(id).unwrap().findings.len(), 1);
        assert!(!store.update_run(Uuid::new_v4(), |_| {}));
    }
}
