use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// How often the scheduler wakes up to look for due jobs.
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fires once per day at the given wall-clock time (UTC).
    DailyAt { hour: u32, minute: u32 },
    /// Fires on a fixed period, measured from the previous run.
    Every(Duration),
}

impl Trigger {
    /// `last_run` doubles as the schedule anchor: `run` seeds it at startup,
    /// so an unanchored (`None`) job only exists before that and counts as
    /// immediately due.
    pub fn is_due(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match *self {
            Trigger::DailyAt { hour, minute } => {
                let Some(target) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                    return false;
                };
                let scheduled = now.date_naive().and_time(target).and_utc();
                now >= scheduled && last_run.map_or(true, |lr| lr < scheduled)
            }
            Trigger::Every(period) => last_run.map_or(true, |lr| now - lr >= period),
        }
    }
}

type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type JobFn = Box<dyn Fn() -> JobFuture + Send + Sync>;

struct ScheduledJob {
    name: String,
    trigger: Trigger,
    last_run: Option<DateTime<Utc>>,
    run: JobFn,
}

/// Cooperative single-threaded scheduler: polls once a minute and runs any
/// due job to completion before checking again. A long scan simply delays
/// the next poll, so overlapping runs of the same job cannot happen.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn add_job<F, Fut>(&mut self, name: &str, trigger: Trigger, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        tracing::info!(job = name, ?trigger, "scheduled job registered");
        self.jobs.push(ScheduledJob {
            name: name.to_string(),
            trigger,
            last_run: None,
            run: Box::new(move || Box::pin(job())),
        });
    }

    /// Runs every due job sequentially. A job error is logged and does not
    /// unschedule the job or stop the others.
    pub async fn run_pending(&mut self, now: DateTime<Utc>) {
        for job in &mut self.jobs {
            if !job.trigger.is_due(job.last_run, now) {
                continue;
            }

            tracing::info!(job = %job.name, "running scheduled job");
            job.last_run = Some(now);
            if let Err(err) = (job.run)().await {
                tracing::error!(job = %job.name, error = %err, "scheduled job failed");
            }
        }
    }

    /// Anchors every job at `now`: `DailyAt` waits for the next target
    /// instant and `Every` waits one full period. A restart therefore never
    /// reruns a window that already passed today.
    fn seed_baseline(&mut self, now: DateTime<Utc>) {
        for job in &mut self.jobs {
            job.last_run = Some(now);
        }
    }

    /// Poll loop; never returns. Callers stop it by dropping the future
    /// (e.g. a `select!` against a shutdown signal).
    pub async fn run(mut self) {
        self.seed_baseline(Utc::now());
        loop {
            self.run_pending(Utc::now()).await;
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
