use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the node API transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 409: Ironic holds a lock on the node or is otherwise busy.
    #[error("ironic is busy (HTTP 409): {message}")]
    Conflict { message: String },

    #[error("node {0} not found")]
    NotFound(String),

    #[error("ironic returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request to ironic failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response from ironic: {0}")]
    Decode(String),
}

impl ApiError {
    /// The only error the retry executor treats as transient.
    pub fn is_busy(&self) -> bool {
        matches!(self, ApiError::Conflict { .. })
    }

    pub(crate) fn from_status(status: StatusCode, node_id: &str, body: &str) -> Self {
        let message = fault_string(body);
        match status {
            StatusCode::CONFLICT => ApiError::Conflict { message },
            StatusCode::NOT_FOUND => ApiError::NotFound(node_id.to_string()),
            _ => ApiError::Status {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error_message: String,
}

#[derive(Deserialize)]
struct Fault {
    faultstring: String,
}

/// Ironic wraps its fault as a JSON document encoded inside a JSON string.
fn fault_string(body: &str) -> String {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return body.trim().to_string();
    };
    match serde_json::from_str::<Fault>(&envelope.error_message) {
        Ok(fault) => fault.faultstring,
        Err(_) => envelope.error_message,
    }
}
