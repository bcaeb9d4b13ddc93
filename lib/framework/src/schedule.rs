use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::TimeDelta;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;

use crate::exception::CoreRsResult;
use crate::log;
use crate::task;

pub struct JobContext {
    pub name: &'static str,
    pub scheduled_time: DateTime<Utc>,
}

trait Job<S>: Send {
    fn execute(&self, state: S, context: JobContext) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F, Fut, S> Job<S> for F
where
    F: Fn(S, JobContext) -> Fut + Send,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn execute(&self, state: S, context: JobContext) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self(state, context))
    }
}

struct Schedule<S> {
    name: &'static str,
    job: Box<dyn Job<S>>,
    interval: Duration,
}

pub struct Scheduler<S> {
    initial_delay: Duration,
    schedules: Vec<Schedule<S>>,
}

impl<S> Scheduler<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            schedules: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Runs `job` every `interval`, first run one interval after the initial delay.
    /// Each run is spawned, a slow run never delays the next tick.
    pub fn schedule_fixed_rate<J, Fut>(&mut self, name: &'static str, job: J, interval: Duration)
    where
        J: Fn(S, JobContext) -> Fut + Copy + Send + 'static,
        Fut: Future<Output = CoreRsResult<()>> + Send + 'static,
    {
        let job = move |state: S, context| process_job(job, state, context);
        self.schedules.push(Schedule {
            name,
            job: Box::new(job),
            interval,
        });
    }

    pub async fn start(self, state: S, shutdown_signal: broadcast::Receiver<()>) -> CoreRsResult<()> {
        let mut handles = Vec::with_capacity(self.schedules.len());
        for schedule in self.schedules {
            let state = state.clone();
            let mut shutdown_signal = shutdown_signal.resubscribe();
            let initial_delay = self.initial_delay;
            handles.push(tokio::spawn(async move {
                let start = Instant::now();
                let start_time = Utc::now();
                let mut next = start + initial_delay + schedule.interval;
                loop {
                    let scheduled_time = start_time + TimeDelta::from_std(next - start).unwrap_or(TimeDelta::zero());
                    info!(
                        name = schedule.name,
                        scheduled_time = scheduled_time.to_rfc3339_opts(SecondsFormat::Millis, true),
                        "scheduled job"
                    );
                    tokio::select! {
                        _ = shutdown_signal.recv() => {
                            return;
                        }
                        () = time::sleep_until(next) => {
                            let context = JobContext {
                                name: schedule.name,
                                scheduled_time,
                            };
                            task::track(schedule.job.execute(state.clone(), context));
                            next += schedule.interval;
                        }
                    }
                }
            }));
        }
        info!("scheduler started");
        for handle in handles {
            handle.await?;
        }
        info!("scheduler stopped");
        Ok(())
    }
}

impl<S> Default for Scheduler<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

async fn process_job<S, J, Fut>(job: J, state: S, context: JobContext)
where
    J: Fn(S, JobContext) -> Fut,
    Fut: Future<Output = CoreRsResult<()>>,
{
    log::start_action("job", None, async move {
        let name = context.name;
        let scheduled_time = context.scheduled_time.to_rfc3339_opts(SecondsFormat::Millis, true);
        debug!(job = name, scheduled_time, "context");
        job(state, context).await
    })
    .await;
}
