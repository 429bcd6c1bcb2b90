//! Core error types for physiotrack-core.
//!
//! Only [`ValidationError`] is meant to reach the operator. Transport and
//! background storage failures are logged where they happen and the session
//! keeps running.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for physiotrack-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Operator input rejected at the edit boundary
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Broker transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// An external collaborator (registry, store) refused the request
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors raised by operator edits and commands.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required value was not supplied
    #[error("Missing value for '{0}'")]
    MissingField(&'static str),

    /// Durations and counts must be strictly positive
    #[error("'{field}' must be a positive number, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    /// Pressure band with min above max
    #[error("Invalid pressure band: min ({min}) must not exceed max ({max})")]
    InvalidRange { min: f64, max: f64 },

    /// Action not allowed while a session is active
    #[error("Stop the session before {0}")]
    SessionActive(&'static str),

    /// No exercise mode matches the label
    #[error("Unknown exercise mode: {0}")]
    UnknownMode(String),

    /// Patient record is missing
    #[error("Patient does not exist: {0}")]
    PatientNotFound(String),

    /// Device id is empty or not among the scanned candidates
    #[error("Invalid device: {0}")]
    InvalidDevice(String),
}

/// Broker transport errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Publish attempted while disconnected
    #[error("Broker is not connected")]
    NotConnected,

    /// Client request could not be queued
    #[error("Broker client error: {0}")]
    Client(String),

    /// Subscription request for a topic failed
    #[error("Subscription to '{topic}' failed: {message}")]
    Subscribe { topic: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<rumqttc::ClientError> for TransportError {
    fn from(err: rumqttc::ClientError) -> Self {
        TransportError::Client(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
