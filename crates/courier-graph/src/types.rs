// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send API request and response bodies.

use courier_core::{OutboundRequest, PolicyTag};
use serde::{Deserialize, Serialize};

/// `messaging_type` value for a reply inside the free-messaging window.
pub const MESSAGING_TYPE_RESPONSE: &str = "RESPONSE";

/// `messaging_type` value for a tagged message outside the window.
pub const MESSAGING_TYPE_MESSAGE_TAG: &str = "MESSAGE_TAG";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendRequest {
    pub recipient: Recipient,
    pub message: MessageBody,
    pub messaging_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<PolicyTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageBody {
    pub text: String,
}

impl SendRequest {
    pub fn from_outbound(request: &OutboundRequest) -> Self {
        Self {
            recipient: Recipient {
                id: request.recipient_id.0.clone(),
            },
            message: MessageBody {
                text: request.body.clone(),
            },
            messaging_type: if request.tag.is_some() {
                MESSAGING_TYPE_MESSAGE_TAG
            } else {
                MESSAGING_TYPE_RESPONSE
            },
            tag: request.tag,
        }
    }
}

/// Successful Send API answer.
#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub recipient_id: Option<String>,
    pub message_id: String,
}

/// Error envelope returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    pub code: i64,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}
