// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Log target: writes every sample to the application log

use async_trait::async_trait;
use log::info;
use serde_json::{json, Value};

use super::{DispatchContext, DispatchError, DispatchTarget};

/// Target printing samples at `info` level
#[derive(Debug, Default)]
pub struct LogTarget;

impl LogTarget {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DispatchTarget for LogTarget {
    fn name(&self) -> &str {
        "log"
    }

    async fn dispatch(&self, context: &DispatchContext) -> Result<Value, DispatchError> {
        let values: Vec<String> = context
            .attributes
            .iter()
            .map(|attribute| format!("{}={}", attribute.name, attribute.value))
            .collect();

        info!(
            "[{}] {} sample at {}: {}",
            context.handler_id,
            context.sensor,
            context.timestamp.to_rfc3339(),
            values.join(", ")
        );

        Ok(json!({ "logged": context.attributes.len() }))
    }
}
