// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sensorstream project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Handler configuration
//!
//! Every handler gets its own acquisition job. All jobs share the sensor and
//! the interval, each one delivers samples to its own target.

use serde::{Deserialize, Serialize};

/// One configured endpoint of the acquisition scheduler.
///
/// # Example
///
/// ```yaml
/// handlers:
///   - id: console
///     target:
///       type: log
///   - id: dashboard
///     target:
///       type: http
///       url: https://example.com/hooks/vibration
///       timeout_seconds: 5
///       retry_count: 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Unique handler identifier, carried in every dispatch context
    pub id: String,

    /// Where the samples go
    pub target: TargetConfig,
}

/// Dispatch target of a handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetConfig {
    /// Write samples to the application log
    Log,

    /// POST samples as JSON to a webhook
    Http {
        url: String,
        #[serde(default = "default_timeout_seconds")]
        timeout_seconds: u64,
        #[serde(default = "default_retry_count")]
        retry_count: u32,
        /// Sent as `Authorization: Bearer <token>`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_token: Option<String>,
    },
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    3
}

impl HandlerConfig {
    /// Handler writing to the application log
    pub fn log(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: TargetConfig::Log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_target_defaults() {
        let yaml = r#"
id: dashboard
target:
  type: http
  url: http://localhost:8080/hook
"#;
        let handler: HandlerConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(
            handler.target,
            TargetConfig::Http {
                url: "http://localhost:8080/hook".to_string(),
                timeout_seconds: 10,
                retry_count: 3,
                auth_token: None,
            }
        );
    }

    #[test]
    fn test_log_target_round_trip() {
        let yaml = serde_yml::to_string(&HandlerConfig::log("console")).unwrap();
        let handler: HandlerConfig = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(handler.target, TargetConfig::Log);
    }
}
