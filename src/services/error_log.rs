use std::future::Future;

use crate::db::Repository;
use crate::error::{AppError, Result};

/// Service-boundary interceptor: records failures in the `error_logs` table
/// and hands the same error back to the caller.
#[derive(Clone)]
pub struct ErrorLogger {
    repository: Repository,
}

impl ErrorLogger {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn intercept<T, F>(&self, context: &str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match operation.await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.record(context, &e).await;
                Err(e)
            }
        }
    }

    /// Absent optional features and validation failures are expected outcomes
    /// and only reach the tracing output.
    pub async fn record(&self, context: &str, err: &AppError) {
        if !err.is_loggable() {
            tracing::debug!(context, error = %err, "Operation degraded");
            return;
        }

        tracing::error!(context, kind = ?err.kind(), error = %err, "Operation failed");
        let message = format!("{context}: {err}");
        if let Err(e) = self
            .repository
            .insert_error_log(err.type_name(), &message, &detail(err))
            .await
        {
            tracing::warn!(error = %e, "Failed to write error log entry");
        }
    }

    /// Non-error entry, e.g. an operator-initiated shutdown.
    pub async fn note(&self, event_type: &str, message: &str) {
        tracing::info!(event_type, message, "Recording event");
        if let Err(e) = self
            .repository
            .insert_error_log(event_type, message, "")
            .await
        {
            tracing::warn!(error = %e, "Failed to write error log entry");
        }
    }
}

fn detail(err: &AppError) -> String {
    let mut detail = format!("{err:?}");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        detail.push_str("\ncaused by: ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}
