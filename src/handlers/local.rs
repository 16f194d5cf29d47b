// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use tracing::info;

use super::{BackendTypes, Handler, HandlerError};
use crate::event_record::EventRecord;

/// Writes each record to the process log as one JSON line.
#[derive(Debug, Default)]
pub struct LocalHandler;

impl LocalHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for LocalHandler {
    async fn init(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn backend_type(&self) -> BackendTypes {
        BackendTypes::Local
    }

    async fn relay(&self, record: &EventRecord) -> Result<(), HandlerError> {
        let body = serde_json::to_string(record)?;
        info!(
            key = %record.key(),
            event_type = %record.event_type,
            "Relayed event {}",
            body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventType;

    #[tokio::test]
    async fn test_local_relay_never_fails() {
        let handler = LocalHandler::new();
        handler.init().await.unwrap();

        for event_type in [EventType::Create, EventType::Update, EventType::Delete] {
            let record = EventRecord::new("ns/foo", event_type, "event").unwrap();
            assert!(handler.relay(&record).await.is_ok());
        }
        assert_eq!(handler.backend_type(), BackendTypes::Local);
    }
}
