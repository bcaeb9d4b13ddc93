use std::future::Future;
use std::sync::LazyLock;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use tracing::Span;
use tracing::info;

use crate::exception::CoreRsResult;

static TASK_TRACKER: LazyLock<TaskTracker> = LazyLock::new(TaskTracker::new);

pub fn spawn_task<T>(task: T) -> JoinHandle<CoreRsResult<()>>
where
    T: Future<Output = CoreRsResult<()>> + Send + 'static,
{
    TASK_TRACKER.spawn(task.instrument(Span::current()))
}

// job runs and message handlers, waited on by shutdown()
pub(crate) fn track<T>(task: T) -> JoinHandle<()>
where
    T: Future<Output = ()> + Send + 'static,
{
    TASK_TRACKER.spawn(task)
}

pub async fn shutdown() {
    info!("waiting for {} task(s) to finish", TASK_TRACKER.len());
    TASK_TRACKER.close();
    TASK_TRACKER.wait().await;
    info!("tasks finished");
}
