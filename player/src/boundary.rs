/// Top-level error boundary.
///
/// Background work is run through [`ErrorBoundary::spawn`]; if it returns an
/// error or panics, the failure is logged and published on the bus as
/// [`AppEvent::AppError`] so the application can show it. The boundary is a
/// plain value built by the entry point; it installs no global hooks.
use std::any::Any;
use std::future::Future;

use tokio::task::JoinHandle;

use crate::bus::SignalBus;
use crate::event::{AppEvent, ErrorReport};

#[derive(Debug, Clone)]
pub struct ErrorBoundary {
    bus: SignalBus,
}

impl ErrorBoundary {
    pub fn new(bus: SignalBus) -> Self {
        Self { bus }
    }

    /// Runs `task` in the background and reports how it failed, if it does.
    ///
    /// The returned handle resolves after the task finished and any report
    /// was published.
    pub fn spawn<F>(&self, context: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boundary = self.clone();
        let inner = tokio::spawn(task);
        tokio::spawn(async move {
            match inner.await {
                Ok(Ok(())) => log::debug!("{context} finished"),
                Ok(Err(e)) => boundary.report(context, &e).await,
                Err(e) if e.is_panic() => boundary.report_panic(context, e.into_panic()).await,
                Err(_) => log::debug!("{context} was cancelled"),
            }
        })
    }

    /// Logs `error` and publishes it. Used for errors caught inline.
    pub async fn report(&self, context: &str, error: &anyhow::Error) {
        self.publish(ErrorReport {
            context: context.to_string(),
            message: format!("{error:?}"),
        })
        .await;
    }

    async fn report_panic(&self, context: &str, payload: Box<dyn Any + Send>) {
        self.publish(ErrorReport {
            context: context.to_string(),
            message: format!("panicked: {}", panic_message(payload.as_ref())),
        })
        .await;
    }

    async fn publish(&self, report: ErrorReport) {
        log::error!("Unhandled error in {}: {}", report.context, report.message);
        if !self.bus.publish(AppEvent::AppError(report)).await {
            log::debug!("Notification bus closed; error report dropped");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
