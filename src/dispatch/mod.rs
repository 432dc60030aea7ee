// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dispatch targets
//!
//! A dispatch target is the downstream consumer of every acquired sample. The
//! scheduler converts the named outputs of a sample into typed [`Attribute`]s,
//! wraps them into a [`DispatchContext`] and hands it to the target bound to the
//! handler. Targets never influence the acquisition cadence: their result is
//! only logged and counted.
//!
//! # Architecture
//!
//! ```text
//!   AcquisitionJob
//!         ↓
//!  DispatchTarget trait
//!         ↓
//! ┌─────────────┬─────────────┬─────────────┐
//! │     Log     │    HTTP     │   Channel   │
//! │   Target    │   Webhook   │   Target    │
//! └─────────────┴─────────────┴─────────────┘
//! ```

mod channel;
mod http;
mod log;

pub use self::channel::ChannelTarget;
pub use self::http::HttpTarget;
pub use self::log::LogTarget;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{HandlerConfig, TargetConfig};
use crate::sensor::{Outputs, SensorKind};

/// Errors raised while converting or delivering a sample
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Output '{name}' is not declared for this sensor")]
    UnknownOutput { name: String },

    #[error("HTTP dispatch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Target rejected the sample with HTTP status {status}")]
    Rejected { status: u16 },

    #[error("Dispatch channel is closed")]
    ChannelClosed,
}

/// Value type of a dispatched attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Double,
    Integer,
}

/// Typed attribute carried by a [`DispatchContext`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    pub value: serde_json::Value,
}

/// Declaration of one output, as advertised by a sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeclaration {
    pub name: &'static str,
    pub attr_type: AttributeType,
}

/// Outputs a sensor is allowed to emit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMetadata {
    outputs: Vec<OutputDeclaration>,
}

impl OutputMetadata {
    pub fn new(outputs: Vec<OutputDeclaration>) -> Self {
        Self { outputs }
    }

    /// Every output of `kind` is declared as a double
    pub fn for_sensor(kind: SensorKind) -> Self {
        Self::new(
            kind.output_names()
                .iter()
                .copied()
                .map(|name| OutputDeclaration {
                    name,
                    attr_type: AttributeType::Double,
                })
                .collect(),
        )
    }

    pub fn outputs(&self) -> &[OutputDeclaration] {
        &self.outputs
    }

    /// Convert named outputs into typed attributes.
    ///
    /// Values are coerced to the declared type. Names the metadata does not
    /// declare are rejected with [`DispatchError::UnknownOutput`].
    pub fn outputs_to_attrs(&self, outputs: &Outputs) -> Result<Vec<Attribute>, DispatchError> {
        outputs
            .iter()
            .map(|(name, value)| {
                let declaration = self
                    .outputs
                    .iter()
                    .find(|declaration| declaration.name == name.as_str())
                    .ok_or_else(|| DispatchError::UnknownOutput { name: name.clone() })?;

                let value = match declaration.attr_type {
                    AttributeType::Double => serde_json::Value::from(*value),
                    AttributeType::Integer => serde_json::Value::from(value.round() as i64),
                };

                Ok(Attribute {
                    name: name.clone(),
                    attr_type: declaration.attr_type,
                    value,
                })
            })
            .collect()
    }
}

/// Context handed to a target for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchContext {
    pub handler_id: String,
    pub sensor: SensorKind,
    pub timestamp: DateTime<Utc>,
    pub attributes: Vec<Attribute>,
}

impl DispatchContext {
    /// Look up an attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| &attribute.value)
    }
}

/// Downstream consumer of acquired samples
#[async_trait]
pub trait DispatchTarget: Send + Sync {
    /// Short target type name used in logs
    fn name(&self) -> &str;

    /// Deliver one sample and return the target's result payload
    async fn dispatch(&self, context: &DispatchContext) -> Result<serde_json::Value, DispatchError>;
}

/// Create the target described by a handler configuration
pub fn create_target(config: &HandlerConfig) -> Arc<dyn DispatchTarget> {
    match &config.target {
        TargetConfig::Log => Arc::new(LogTarget::new()),
        TargetConfig::Http {
            url,
            timeout_seconds,
            retry_count,
            auth_token,
        } => {
            let mut target = HttpTarget::new(url.clone())
                .with_timeout_seconds(*timeout_seconds)
                .with_retry_count(*retry_count);
            if let Some(token) = auth_token {
                target = target.with_auth_token(token.clone());
            }
            Arc::new(target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accel_outputs() -> Outputs {
        Outputs::from([
            ("X".to_string(), 390.0),
            ("Y".to_string(), -218.4),
            ("Z".to_string(), 998.4),
        ])
    }

    #[test]
    fn test_outputs_to_attrs() {
        let metadata = OutputMetadata::for_sensor(SensorKind::Adxl345);
        let attrs = metadata.outputs_to_attrs(&accel_outputs()).unwrap();

        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].name, "X");
        assert_eq!(attrs[0].attr_type, AttributeType::Double);
        assert_eq!(attrs[1].value, serde_json::json!(-218.4));
    }

    #[test]
    fn test_outputs_to_attrs_rejects_undeclared_output() {
        let metadata = OutputMetadata::for_sensor(SensorKind::Bme280);
        let err = metadata.outputs_to_attrs(&accel_outputs()).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownOutput { name } if name == "X"));
    }

    #[test]
    fn test_integer_coercion() {
        let metadata = OutputMetadata::new(vec![OutputDeclaration {
            name: "Z",
            attr_type: AttributeType::Integer,
        }]);
        let outputs = Outputs::from([("Z".to_string(), 998.4)]);

        let attrs = metadata.outputs_to_attrs(&outputs).unwrap();
        assert_eq!(attrs[0].value, serde_json::json!(998));
    }

    #[test]
    fn test_context_serialization() {
        let metadata = OutputMetadata::for_sensor(SensorKind::Adxl345);
        let context = DispatchContext {
            handler_id: "vibration".to_string(),
            sensor: SensorKind::Adxl345,
            timestamp: Utc::now(),
            attributes: metadata.outputs_to_attrs(&accel_outputs()).unwrap(),
        };

        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["handler_id"], "vibration");
        assert_eq!(json["sensor"], "adxl345");
        assert_eq!(json["attributes"][2]["type"], "double");
        assert_eq!(context.attribute("Z"), Some(&serde_json::json!(998.4)));
    }
}
