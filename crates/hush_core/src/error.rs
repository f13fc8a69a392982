#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use hush_domain::{ParseIdError, Username};
use thiserror::Error;

/// Failure reported by the chat platform collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
	NotSupported(Option<String>),
	NotAuthorized(Option<String>),
	/// The call did not complete within the enforcement timeout.
	Timeout(Duration),
	Internal(String),
}

impl fmt::Display for PlatformError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NotSupported(Some(detail)) => write!(f, "not supported: {detail}"),
			Self::NotSupported(None) => f.write_str("not supported"),
			Self::NotAuthorized(Some(detail)) => write!(f, "not authorized: {detail}"),
			Self::NotAuthorized(None) => f.write_str("not authorized"),
			Self::Timeout(after) => write!(f, "timed out after {}ms", after.as_millis()),
			Self::Internal(msg) => write!(f, "internal error: {msg}"),
		}
	}
}

impl std::error::Error for PlatformError {}

/// Errors surfaced by the moderation engine to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModerationError {
	#[error("only administrators can use this command")]
	PermissionDenied,

	#[error("this command can only be used in groups")]
	WrongContext,

	#[error("couldn't find user @{0} in this chat")]
	UserNotFound(Username),

	#[error("@{0} is already in the whitelist")]
	AlreadyPresent(Username),

	#[error("@{0} is not in the whitelist")]
	NotFound(Username),

	#[error("enforcement failed: {0}")]
	EnforcementFailed(PlatformError),

	#[error("invalid identity: {0}")]
	InvalidIdentity(#[from] ParseIdError),

	#[error("platform lookup failed: {0}")]
	Lookup(PlatformError),
}
