use std::future::Future;

use tokio::task_local;
use tracing::Instrument;
use tracing::error;
use tracing::info_span;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::exception::CoreRsResult;
use crate::exception::Exception;
use crate::exception::Severity;

pub mod id_generator;

task_local! {
    static CURRENT_ACTION_ID: String
}

/// Installs the console subscriber, `RUST_LOG` overrides the default `info` filter.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(false) // generally cloud log console doesn't support color
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .init();
}

/// Runs `task` as one action: a span with a fresh action id, with any returned
/// exception logged at the level of its severity instead of propagated.
pub async fn start_action<T>(action: &str, ref_id: Option<String>, task: T)
where
    T: Future<Output = CoreRsResult<()>>,
{
    let action_id = id_generator::random_id();
    let action_span = info_span!("action", action, action_id, ref_id);
    CURRENT_ACTION_ID
        .scope(
            action_id,
            async {
                if let Err(e) = task.await {
                    log_exception(&e);
                }
            }
            .instrument(action_span),
        )
        .await;
}

pub fn log_exception(e: &Exception) {
    let message = &e.message;
    let backtrace = e.to_string();
    match (e.severity, e.code.as_deref()) {
        (Severity::Warn, Some(error_code)) => warn!(error_code, backtrace, "{message}"),
        (Severity::Warn, None) => warn!(backtrace, "{message}"),
        (Severity::Error, Some(error_code)) => error!(error_code, backtrace, "{message}"),
        (Severity::Error, None) => error!(backtrace, "{message}"),
    }
}

pub fn current_action_id() -> Option<String> {
    CURRENT_ACTION_ID.try_with(Clone::clone).ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    #[tokio::test]
    async fn start_action_scopes_action_id() {
        assert_eq!(super::current_action_id(), None);

        let seen = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&seen);
        super::start_action("test", None, async move {
            *captured.lock().unwrap() = super::current_action_id();
            Ok(())
        })
        .await;

        assert!(seen.lock().unwrap().is_some());
        assert_eq!(super::current_action_id(), None);
    }

    #[tokio::test]
    async fn start_action_swallows_exception() {
        super::start_action("test", Some("ref".to_owned()), async {
            Err(validation_error!(message = "invalid record"))
        })
        .await;
    }
}
