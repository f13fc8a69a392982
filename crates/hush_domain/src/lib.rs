#![forbid(unsafe_code)]

use core::fmt;
use core::hash::{Hash, Hasher};
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Platform chat identifier. Group chats use negative ids on most platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct ChatId(i64);

impl ChatId {
	pub const fn new(id: i64) -> Self {
		Self(id)
	}

	pub const fn get(self) -> i64 {
		self.0
	}
}

impl fmt::Display for ChatId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ChatId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_i64(s).map(Self)
	}
}

/// Platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct UserId(i64);

impl UserId {
	pub const fn new(id: i64) -> Self {
		Self(id)
	}

	pub const fn get(self) -> i64 {
		self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for UserId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_i64(s).map(Self)
	}
}

fn parse_i64(s: &str) -> Result<i64, ParseIdError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(ParseIdError::Empty);
	}
	s.parse::<i64>()
		.map_err(|_| ParseIdError::InvalidFormat(format!("expected integer id, got {s:?}")))
}

/// Case-insensitive user handle.
///
/// Equality and hashing ignore case; `as_str` keeps the spelling it was
/// created with so replies can echo it back.
#[derive(Debug, Clone)]
pub struct Username {
	display: String,
	folded: String,
}

impl Username {
	/// Create a username, stripping surrounding whitespace and one leading `@`.
	pub fn new(name: impl AsRef<str>) -> Result<Self, ParseIdError> {
		let name = name.as_ref().trim();
		let name = name.strip_prefix('@').unwrap_or(name);
		if name.is_empty() {
			return Err(ParseIdError::Empty);
		}
		if name.chars().any(char::is_whitespace) {
			return Err(ParseIdError::InvalidFormat(format!("username contains whitespace: {name:?}")));
		}

		Ok(Self {
			display: name.to_string(),
			folded: name.to_lowercase(),
		})
	}

	pub fn as_str(&self) -> &str {
		&self.display
	}
}

impl PartialEq for Username {
	fn eq(&self, other: &Self) -> bool {
		self.folded == other.folded
	}
}

impl Eq for Username {}

impl Hash for Username {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.folded.hash(state);
	}
}

impl fmt::Display for Username {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.display)
	}
}

impl FromStr for Username {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Username::new(s)
	}
}

/// Member status inside a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberStatus {
	Owner,
	Administrator,
	Member,
	Restricted,
	Left,
	Banned,
}

impl MemberStatus {
	/// Whether this status may issue moderation commands.
	pub const fn is_admin(self) -> bool {
		matches!(self, MemberStatus::Owner | MemberStatus::Administrator)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			MemberStatus::Owner => "owner",
			MemberStatus::Administrator => "administrator",
			MemberStatus::Member => "member",
			MemberStatus::Restricted => "restricted",
			MemberStatus::Left => "left",
			MemberStatus::Banned => "banned",
		}
	}
}

impl fmt::Display for MemberStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn username_is_case_insensitive() {
		let a = Username::new("Alice").unwrap();
		let b = Username::new("@alice").unwrap();
		assert_eq!(a, b);
		assert_eq!(a.as_str(), "Alice");
		assert_eq!(a, "ALICE".parse::<Username>().unwrap());
		assert_ne!(a, Username::new("alic").unwrap());
	}

	#[test]
	fn rejects_empty_or_spaced_usernames() {
		assert!(Username::new("").is_err());
		assert!(Username::new("@").is_err());
		assert!(Username::new("  ").is_err());
		assert!(Username::new("two words").is_err());
	}

	#[test]
	fn ids_parse_and_display() {
		assert_eq!("-1001".parse::<ChatId>().unwrap(), ChatId::new(-1001));
		assert_eq!(UserId::new(42).to_string(), "42");
		assert!("x1".parse::<UserId>().is_err());
		assert!("".parse::<ChatId>().is_err());
	}

	#[test]
	fn admin_statuses() {
		assert!(MemberStatus::Owner.is_admin());
		assert!(MemberStatus::Administrator.is_admin());
		assert!(!MemberStatus::Member.is_admin());
		assert!(!MemberStatus::Restricted.is_admin());
	}
}
