use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

pub const LITHOS_USAGE: &str = "LITHOS_USAGE";
pub const LITHOS_CONFIG_INVALID: &str = "LITHOS_CONFIG_INVALID";
pub const LITHOS_SCRIPT_INVALID: &str = "LITHOS_SCRIPT_INVALID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedErrorKind {
    Usage,
    Config,
    Script,
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(LITHOS_USAGE, CodedErrorKind::Usage, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(LITHOS_CONFIG_INVALID, CodedErrorKind::Config, message)
    }

    pub fn script_invalid(message: impl Into<String>) -> Self {
        Self::new(LITHOS_SCRIPT_INVALID, CodedErrorKind::Script, message)
    }

    fn new(code: &'static str, kind: CodedErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            CodedErrorKind::Usage => 2,
            CodedErrorKind::Config | CodedErrorKind::Script => 3,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}
