// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified error codes shared across the scheduler, executor, stores, and
//! the HTTP surface that sits on top of them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable error kind, mirrored to an HTTP status by callers at
/// the API boundary (see §7 of the design).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Validation,
    NotFound,
    Conflict,
    DeviceOffline,
    TransportError,
    ElementNotFound,
    ValidationFailed,
    ExtractionFailed,
    NavigationExhausted,
    QueueOverflow,
    Cancelled,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::DeviceOffline => 503,
            Self::TransportError => 502,
            Self::ElementNotFound => 404,
            Self::ValidationFailed => 422,
            Self::ExtractionFailed => 422,
            Self::NavigationExhausted => 409,
            Self::QueueOverflow => 503,
            Self::Cancelled => 409,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::DeviceOffline => "DEVICE_OFFLINE",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::ElementNotFound => "ELEMENT_NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::ExtractionFailed => "EXTRACTION_FAILED",
            Self::NavigationExhausted => "NAVIGATION_EXHAUSTED",
            Self::QueueOverflow => "QUEUE_OVERFLOW",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-wide error type. Every fallible public operation in this crate
/// returns `Result<T, EngineError>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for EngineError {}
