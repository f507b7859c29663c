//! # Error Module.
//!
//! This module features the `EigenError` enum for error handling throughout the project.

use thiserror::Error;

/// The crate-wide error variants.
#[derive(Debug, Error)]
pub enum EigenError {
	/// Configuration error
	#[error("ConfigurationError: {0}")]
	ConfigurationError(String),

	/// File read/write error
	#[error("FileIOError: {0}")]
	FileIOError(String),

	/// Input/output error
	#[error("IOError: {0}")]
	IOError(std::io::Error),

	/// Parsing error
	#[error("ParsingError: {0}")]
	ParsingError(String),

	/// Peer lookup error
	#[error("PeerNotFound: {0}")]
	PeerNotFound(String),

	/// Background task error
	#[error("TaskError: {0}")]
	TaskError(String),

	/// Validation error
	#[error("ValidationError: {0}")]
	ValidationError(String),
}
