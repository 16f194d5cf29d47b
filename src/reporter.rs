// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sink for errors the controller cannot recover from.
//!
//! Only two things reach a reporter: a cache that never synced, and a record
//! dropped after exhausting its retries. Everything else is retried or
//! suppressed where it happens.

use tracing::error;

use crate::error::RelayError;

pub trait ErrorReporter: Send + Sync {
    fn report(&self, err: &RelayError);
}

/// Logs at `error` level and counts the report.
#[derive(Debug, Default)]
pub struct LoggingErrorReporter;

impl ErrorReporter for LoggingErrorReporter {
    fn report(&self, err: &RelayError) {
        crate::metrics::record_error_reported(err.kind());
        match err.key() {
            Some(key) => error!(key = %key, error = %err, "Unhandled relay error"),
            None => error!(error = %err, "Unhandled relay error"),
        }
    }
}
