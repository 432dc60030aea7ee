// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Channel target
//!
//! Forwards every context into a tokio mpsc channel so that a host program
//! can consume samples in-process.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{DispatchContext, DispatchError, DispatchTarget};

/// Target sending samples to an in-process receiver
#[derive(Debug, Clone)]
pub struct ChannelTarget {
    sender: mpsc::UnboundedSender<DispatchContext>,
}

impl ChannelTarget {
    pub fn new(sender: mpsc::UnboundedSender<DispatchContext>) -> Self {
        Self { sender }
    }

    /// Create a target together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DispatchContext>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl DispatchTarget for ChannelTarget {
    fn name(&self) -> &str {
        "channel"
    }

    async fn dispatch(&self, context: &DispatchContext) -> Result<Value, DispatchError> {
        self.sender
            .send(context.clone())
            .map_err(|_| DispatchError::ChannelClosed)?;
        Ok(json!({ "queued": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorKind;

    fn context() -> DispatchContext {
        DispatchContext {
            handler_id: "vibration".to_string(),
            sensor: SensorKind::Adxl345,
            timestamp: chrono::Utc::now(),
            attributes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_channel_delivers_context() {
        let (target, mut receiver) = ChannelTarget::channel();
        target.dispatch(&context()).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.handler_id, "vibration");
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (target, receiver) = ChannelTarget::channel();
        drop(receiver);

        let err = target.dispatch(&context()).await.unwrap_err();
        assert!(matches!(err, DispatchError::ChannelClosed));
    }
}
