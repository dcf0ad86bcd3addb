//! Recurring background task scheduler.
//!
//! A single loop wakes once a minute and runs every due task sequentially,
//! so jobs never overlap. Failures retry after a fixed delay a bounded
//! number of times; once retries are exhausted the task falls back onto its
//! normal schedule with the failure logged, so one bad run can never wedge
//! a recurring job. Completed runs land in a bounded history ring.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Timelike, Utc, Weekday};
use pacer_core::time::Clock;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

use crate::error::{JobError, SchedulerError};

/// How often the run loop wakes to look for due tasks.
pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Fixed delay before a failed run is retried.
pub const RETRY_DELAY_MINUTES: i64 = 5;

/// Completed runs kept in the history ring.
pub const HISTORY_CAPACITY: usize = 1000;

//
// ─── FREQUENCY ─────────────────────────────────────────────────────────────────
//

/// When a task recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Run a single time, then deactivate.
    Once,
    /// Every 24 hours, preserving the time of day.
    Daily,
    /// The next occurrence of a weekday, preserving the time of day.
    Weekly(Weekday),
    /// A day of the month, clamped to the month's length.
    Monthly { day: u32 },
    /// A fixed interval in minutes.
    Every { minutes: u32 },
}

impl Frequency {
    /// The next run strictly after `from`, or `None` for a one-shot task
    /// that has already run.
    #[must_use]
    pub fn next_run_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Frequency::Once => None,
            Frequency::Daily => Some(from + Duration::hours(24)),
            Frequency::Weekly(weekday) => {
                let ahead = i64::from(
                    (weekday.num_days_from_monday() + 7 - from.weekday().num_days_from_monday())
                        % 7,
                );
                let days = if ahead == 0 { 7 } else { ahead };
                Some(from + Duration::days(days))
            }
            Frequency::Monthly { day } => Some(next_monthly(from, day)),
            Frequency::Every { minutes } => Some(from + Duration::minutes(i64::from(minutes))),
        }
    }
}

/// The next time `day` occurs, clamped to each month's length and keeping
/// the time of day. A target within the current month but after `from`
/// is used directly.
fn next_monthly(from: DateTime<Utc>, day: u32) -> DateTime<Utc> {
    let day = day.max(1);
    let this_month = at_clamped_day(from, day);
    if this_month > from {
        return this_month;
    }
    let next = from + Months::new(1);
    at_clamped_day(next, day)
}

fn at_clamped_day(anchor: DateTime<Utc>, day: u32) -> DateTime<Utc> {
    let clamped = day.min(days_in_month(anchor.year(), anchor.month()));
    Utc.with_ymd_and_hms(
        anchor.year(),
        anchor.month(),
        clamped,
        anchor.hour(),
        anchor.minute(),
        anchor.second(),
    )
    .single()
    .unwrap_or(anchor)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

//
// ─── JOBS ──────────────────────────────────────────────────────────────────────
//

/// What a successful run produced, for the history ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub summary: String,
    pub detail: serde_json::Value,
}

impl JobReport {
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_detail(summary: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            detail,
        }
    }
}

/// The work a scheduled task performs.
#[async_trait]
pub trait Job: Send + Sync {
    /// Run once at `now`.
    ///
    /// # Errors
    ///
    /// Returns `JobError` when the run fails; the scheduler handles the
    /// retry policy.
    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, JobError>;
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Outcome of one recorded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success { summary: String },
    Failure { error: String },
}

/// One entry in the bounded run history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub outcome: RunOutcome,
}

/// Snapshot of one task's schedule state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub name: String,
    pub frequency: Frequency,
    pub active: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

struct TaskState {
    name: String,
    frequency: Frequency,
    job: Arc<dyn Job>,
    active: bool,
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    retry_count: u32,
    max_retries: u32,
}

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<String, TaskState>,
    history: VecDeque<RunRecord>,
}

impl Inner {
    fn record(&mut self, record: RunRecord) {
        self.history.push_back(record);
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Single-loop scheduler for recurring maintenance tasks.
pub struct TaskScheduler {
    clock: Clock,
    inner: Mutex<Inner>,
    stop_tx: watch::Sender<bool>,
}

impl TaskScheduler {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
            stop_tx,
        }
    }

    /// Register a task. Its first run is due immediately; later runs
    /// follow `frequency`. Registering an existing name replaces it.
    pub async fn register(
        &self,
        name: impl Into<String>,
        frequency: Frequency,
        max_retries: u32,
        job: Arc<dyn Job>,
    ) {
        let name = name.into();
        let state = TaskState {
            name: name.clone(),
            frequency,
            job,
            active: true,
            next_run: Some(self.clock.now()),
            last_run: None,
            retry_count: 0,
            max_retries,
        };
        let mut inner = self.inner.lock().await;
        inner.tasks.insert(name, state);
    }

    /// Unregister a task. Returns whether a task by that name existed. Its
    /// past runs stay in the history.
    pub async fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner.tasks.remove(name).is_some()
    }

    /// Run every due task once, in name order. Exposed so tests can drive
    /// the schedule without waiting on wall time.
    pub async fn tick_at(&self, now: DateTime<Utc>) {
        let due: Vec<(String, Arc<dyn Job>)> = {
            let inner = self.inner.lock().await;
            inner
                .tasks
                .values()
                .filter(|t| t.active && t.next_run.is_some_and(|at| at <= now))
                .map(|t| (t.name.clone(), Arc::clone(&t.job)))
                .collect()
        };

        // The lock is dropped while a job runs; the loop itself never
        // runs two jobs at once.
        for (name, job) in due {
            let result = job.run(now).await;
            let mut inner = self.inner.lock().await;
            let Some(task) = inner.tasks.get_mut(&name) else {
                continue;
            };
            match result {
                Ok(report) => {
                    task.last_run = Some(now);
                    task.retry_count = 0;
                    task.next_run = task.frequency.next_run_after(now);
                    if task.next_run.is_none() {
                        task.active = false;
                    }
                    info!(task = name.as_str(), summary = report.summary.as_str(), "task ran");
                    inner.record(RunRecord {
                        task: name.clone(),
                        started_at: now,
                        outcome: RunOutcome::Success {
                            summary: report.summary,
                        },
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    task.retry_count += 1;
                    if task.retry_count <= task.max_retries {
                        task.next_run = Some(now + Duration::minutes(RETRY_DELAY_MINUTES));
                        warn!(
                            task = name.as_str(),
                            attempt = task.retry_count,
                            error = message.as_str(),
                            "task failed, retrying"
                        );
                    } else {
                        // Give up on this occurrence; fall back onto the
                        // normal schedule with a clean retry budget.
                        error!(
                            task = name.as_str(),
                            error = message.as_str(),
                            "task failed after exhausting retries"
                        );
                        task.retry_count = 0;
                        task.next_run = task.frequency.next_run_after(now);
                        if task.next_run.is_none() {
                            task.active = false;
                        }
                    }
                    inner.record(RunRecord {
                        task: name.clone(),
                        started_at: now,
                        outcome: RunOutcome::Failure { error: message },
                    });
                }
            }
        }
    }

    /// Drive the schedule until `stop` is called. Stopping never
    /// interrupts a run already in flight; it only prevents the next tick.
    pub async fn run(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            return;
        }
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_at(self.clock.now()).await;
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        info!("scheduler stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Signal the run loop to exit after the current tick.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Run one task immediately, outside its schedule. The normal
    /// `next_run` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::UnknownTask` for an unregistered name, or
    /// the job's own error if the run fails.
    pub async fn run_now(&self, name: &str) -> Result<JobReport, SchedulerError> {
        let job = {
            let inner = self.inner.lock().await;
            let task = inner
                .tasks
                .get(name)
                .ok_or_else(|| SchedulerError::UnknownTask(name.to_owned()))?;
            Arc::clone(&task.job)
        };

        let now = self.clock.now();
        let result = job.run(now).await;

        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.tasks.get_mut(name) {
            task.last_run = Some(now);
            task.retry_count = 0;
        }
        match result {
            Ok(report) => {
                inner.record(RunRecord {
                    task: name.to_owned(),
                    started_at: now,
                    outcome: RunOutcome::Success {
                        summary: report.summary.clone(),
                    },
                });
                Ok(report)
            }
            Err(e) => {
                inner.record(RunRecord {
                    task: name.to_owned(),
                    started_at: now,
                    outcome: RunOutcome::Failure {
                        error: e.to_string(),
                    },
                });
                Err(e.into())
            }
        }
    }

    /// Snapshot of every registered task, in name order.
    pub async fn status(&self) -> Vec<TaskStatus> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .values()
            .map(|t| TaskStatus {
                name: t.name.clone(),
                frequency: t.frequency,
                active: t.active,
                next_run: t.next_run,
                last_run: t.last_run,
                retry_count: t.retry_count,
            })
            .collect()
    }

    /// Snapshot of the run history, oldest first.
    pub async fn history(&self) -> Vec<RunRecord> {
        let inner = self.inner.lock().await;
        inner.history.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::time::{fixed_clock, fixed_now};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingJob {
        runs: AtomicU32,
        fail_first: u32,
    }

    impl CountingJob {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU32::new(0),
                fail_first: 0,
            })
        }

        fn failing(times: u32) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU32::new(0),
                fail_first: times,
            })
        }

        fn count(&self) -> u32 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Job for CountingJob {
        async fn run(&self, _now: DateTime<Utc>) -> Result<JobReport, JobError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(JobError::Failed(format!("boom {n}")));
            }
            Ok(JobReport::new("ok"))
        }
    }

    #[test]
    fn daily_recurs_exactly_a_day_later() {
        let from = fixed_now();
        assert_eq!(
            Frequency::Daily.next_run_after(from),
            Some(from + Duration::hours(24))
        );
    }

    #[test]
    fn weekly_lands_on_the_requested_weekday() {
        // fixed_now is a Monday.
        let from = fixed_now();
        let next = Frequency::Weekly(Weekday::Wed).next_run_after(from).unwrap();
        assert_eq!(next, from + Duration::days(2));

        // Same weekday means a full week ahead, never zero.
        let next = Frequency::Weekly(Weekday::Mon).next_run_after(from).unwrap();
        assert_eq!(next, from + Duration::days(7));
    }

    #[test]
    fn monthly_clamps_day_31_to_short_months() {
        // 2024-01-31 12:00 UTC.
        let from = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        let next = Frequency::Monthly { day: 31 }.next_run_after(from).unwrap();
        // February 2024 has 29 days.
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());
    }

    #[test]
    fn monthly_uses_the_current_month_when_still_ahead() {
        let from = Utc.with_ymd_and_hms(2024, 2, 5, 12, 0, 0).unwrap();
        let next = Frequency::Monthly { day: 20 }.next_run_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 20, 12, 0, 0).unwrap());
    }

    #[test]
    fn once_never_recurs() {
        assert_eq!(Frequency::Once.next_run_after(fixed_now()), None);
    }

    #[tokio::test]
    async fn due_task_runs_and_reschedules() {
        let scheduler = TaskScheduler::new(fixed_clock());
        let job = CountingJob::new();
        scheduler
            .register("sweep", Frequency::Every { minutes: 30 }, 3, job.clone())
            .await;

        scheduler.tick_at(fixed_now()).await;
        assert_eq!(job.count(), 1);

        // Not due again until the interval elapses.
        scheduler.tick_at(fixed_now() + Duration::minutes(1)).await;
        assert_eq!(job.count(), 1);
        scheduler.tick_at(fixed_now() + Duration::minutes(30)).await;
        assert_eq!(job.count(), 2);

        let status = scheduler.status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].retry_count, 0);
        assert_eq!(
            status[0].next_run,
            Some(fixed_now() + Duration::minutes(60))
        );
    }

    #[tokio::test]
    async fn failure_retries_after_the_fixed_delay() {
        let scheduler = TaskScheduler::new(fixed_clock());
        let job = CountingJob::failing(1);
        scheduler
            .register("flaky", Frequency::Daily, 3, job.clone())
            .await;

        scheduler.tick_at(fixed_now()).await;
        assert_eq!(job.count(), 1);
        let status = scheduler.status().await;
        assert_eq!(status[0].retry_count, 1);
        assert_eq!(
            status[0].next_run,
            Some(fixed_now() + Duration::minutes(RETRY_DELAY_MINUTES))
        );

        // The retry succeeds and the task falls back onto its schedule.
        let retry_at = fixed_now() + Duration::minutes(RETRY_DELAY_MINUTES);
        scheduler.tick_at(retry_at).await;
        assert_eq!(job.count(), 2);
        let status = scheduler.status().await;
        assert_eq!(status[0].retry_count, 0);
        assert_eq!(status[0].next_run, Some(retry_at + Duration::hours(24)));
    }

    #[tokio::test]
    async fn exhausted_retries_return_to_the_normal_schedule() {
        let scheduler = TaskScheduler::new(fixed_clock());
        let job = CountingJob::failing(10);
        scheduler
            .register("doomed", Frequency::Daily, 2, job.clone())
            .await;

        let mut now = fixed_now();
        scheduler.tick_at(now).await; // fail, retry 1
        now += Duration::minutes(RETRY_DELAY_MINUTES);
        scheduler.tick_at(now).await; // fail, retry 2
        now += Duration::minutes(RETRY_DELAY_MINUTES);
        scheduler.tick_at(now).await; // fail, retries exhausted

        assert_eq!(job.count(), 3);
        let status = scheduler.status().await;
        assert!(status[0].active);
        assert_eq!(status[0].retry_count, 0);
        assert_eq!(status[0].next_run, Some(now + Duration::hours(24)));

        let history = scheduler.history().await;
        assert_eq!(history.len(), 3);
        assert!(
            history
                .iter()
                .all(|r| matches!(r.outcome, RunOutcome::Failure { .. }))
        );
    }

    #[tokio::test]
    async fn one_shot_task_deactivates_after_running() {
        let scheduler = TaskScheduler::new(fixed_clock());
        let job = CountingJob::new();
        scheduler
            .register("migrate-once", Frequency::Once, 0, job.clone())
            .await;

        scheduler.tick_at(fixed_now()).await;
        assert_eq!(job.count(), 1);

        let status = scheduler.status().await;
        assert!(!status[0].active);
        assert_eq!(status[0].next_run, None);

        // Never runs again.
        scheduler.tick_at(fixed_now() + Duration::days(30)).await;
        assert_eq!(job.count(), 1);
    }

    #[tokio::test]
    async fn run_now_is_out_of_band() {
        let scheduler = TaskScheduler::new(fixed_clock());
        let job = CountingJob::new();
        scheduler
            .register("sweep", Frequency::Daily, 3, job.clone())
            .await;
        scheduler.tick_at(fixed_now()).await;
        assert_eq!(job.count(), 1);
        let scheduled_next = scheduler.status().await[0].next_run;

        let report = scheduler.run_now("sweep").await.unwrap();
        assert_eq!(report.summary, "ok");
        assert_eq!(job.count(), 2);

        // The schedule is untouched.
        assert_eq!(scheduler.status().await[0].next_run, scheduled_next);

        let err = scheduler.run_now("nope").await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn removed_task_no_longer_runs() {
        let scheduler = TaskScheduler::new(fixed_clock());
        let job = CountingJob::new();
        scheduler
            .register("sweep", Frequency::Every { minutes: 1 }, 0, job.clone())
            .await;
        scheduler.tick_at(fixed_now()).await;
        assert_eq!(job.count(), 1);

        assert!(scheduler.remove("sweep").await);
        assert!(!scheduler.remove("sweep").await);
        scheduler.tick_at(fixed_now() + Duration::minutes(1)).await;
        assert_eq!(job.count(), 1);
        assert!(scheduler.status().await.is_empty());
    }

    #[tokio::test]
    async fn history_ring_is_bounded() {
        let scheduler = TaskScheduler::new(fixed_clock());
        let job = CountingJob::new();
        scheduler
            .register("busy", Frequency::Every { minutes: 1 }, 0, job.clone())
            .await;

        let mut now = fixed_now();
        for _ in 0..(HISTORY_CAPACITY + 25) {
            scheduler.tick_at(now).await;
            now += Duration::minutes(1);
        }

        let history = scheduler.history().await;
        assert_eq!(history.len(), HISTORY_CAPACITY);
        // Oldest entries were dropped.
        assert_eq!(history[0].started_at, fixed_now() + Duration::minutes(25));
    }

    #[tokio::test]
    async fn stop_prevents_the_next_tick() {
        let scheduler = Arc::new(TaskScheduler::new(fixed_clock()));
        let job = CountingJob::new();
        scheduler
            .register("sweep", Frequency::Daily, 0, job.clone())
            .await;

        let runner = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run().await })
        };
        scheduler.stop();
        runner.await.unwrap();
    }
}
