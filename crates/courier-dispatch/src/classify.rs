// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of provider answers onto dispatch outcomes.

use std::collections::HashSet;

use courier_config::model::ProviderConfig;
use courier_core::{CourierError, ProviderResponse};

/// What a send attempt means for the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendClass {
    /// The provider accepted the message.
    Delivered { message_id: String },
    /// Throughput exceeded; requeue and back off.
    RateLimited { detail: String },
    /// The recipient cannot be messaged; never retried.
    PolicyRejected { detail: String },
    /// Anything else, retried with exponential delay.
    Transient { detail: String },
}

/// Code-to-class mapping taken from `[provider]` configuration.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    rate_limit_codes: HashSet<i64>,
    policy_codes: HashSet<i64>,
    policy_subcodes: HashSet<i64>,
}

impl ErrorClassifier {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            rate_limit_codes: config.rate_limit_codes.iter().copied().collect(),
            policy_codes: config.policy_codes.iter().copied().collect(),
            policy_subcodes: config.policy_subcodes.iter().copied().collect(),
        }
    }

    pub fn classify(&self, result: Result<ProviderResponse, CourierError>) -> SendClass {
        match result {
            Ok(ProviderResponse::Delivered { message_id }) => SendClass::Delivered { message_id },
            Ok(ProviderResponse::Rejected {
                code,
                subcode,
                message,
            }) => {
                let detail = match subcode {
                    Some(sub) => format!("provider error {code}/{sub}: {message}"),
                    None => format!("provider error {code}: {message}"),
                };
                if self.rate_limit_codes.contains(&code) {
                    SendClass::RateLimited { detail }
                } else if self.policy_codes.contains(&code)
                    || subcode.is_some_and(|s| self.policy_subcodes.contains(&s))
                {
                    SendClass::PolicyRejected { detail }
                } else {
                    SendClass::Transient { detail }
                }
            }
            Err(e) => SendClass::Transient {
                detail: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(code: i64, subcode: Option<i64>) -> Result<ProviderResponse, CourierError> {
        Ok(ProviderResponse::Rejected {
            code,
            subcode,
            message: "nope".into(),
        })
    }

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::from_config(&ProviderConfig::default())
    }

    #[test]
    fn default_codes_map_to_classes() {
        let c = classifier();
        assert!(matches!(c.classify(rejected(613, None)), SendClass::RateLimited { .. }));
        assert!(matches!(c.classify(rejected(4, None)), SendClass::RateLimited { .. }));
        assert!(matches!(c.classify(rejected(551, None)), SendClass::PolicyRejected { .. }));
        assert!(matches!(
            c.classify(rejected(100, Some(2018278))),
            SendClass::PolicyRejected { .. }
        ));
        assert!(matches!(c.classify(rejected(1, None)), SendClass::Transient { .. }));
    }

    #[test]
    fn transport_errors_are_transient() {
        let class = classifier().classify(Err(CourierError::provider("connection reset")));
        assert_eq!(
            class,
            SendClass::Transient {
                detail: "provider error: connection reset".into()
            }
        );
    }

    #[test]
    fn delivered_carries_message_id() {
        let class = classifier().classify(Ok(ProviderResponse::Delivered {
            message_id: "m.1".into(),
        }));
        assert_eq!(
            class,
            SendClass::Delivered {
                message_id: "m.1".into()
            }
        );
    }
}
