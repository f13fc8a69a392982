#![forbid(unsafe_code)]

use hush_domain::Username;
use parking_lot::RwLock;

/// Result of `WhitelistStore::add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
	Added,
	AlreadyPresent,
}

/// Result of `WhitelistStore::remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
	Removed,
	NotFound,
}

/// Identities exempt from automatic muting.
///
/// Insertion-ordered and case-insensitive. A single lock serializes edits
/// against the membership checks done on the message path.
#[derive(Debug, Default)]
pub struct WhitelistStore {
	entries: RwLock<Vec<Username>>,
}

impl WhitelistStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a store from a seed list; later case-insensitive duplicates are dropped.
	pub fn with_entries(seed: impl IntoIterator<Item = Username>) -> Self {
		let store = Self::new();
		for name in seed {
			store.add(name);
		}
		store
	}

	pub fn contains(&self, identity: &Username) -> bool {
		self.entries.read().iter().any(|e| e == identity)
	}

	pub fn add(&self, identity: Username) -> AddOutcome {
		let mut entries = self.entries.write();
		if entries.iter().any(|e| *e == identity) {
			return AddOutcome::AlreadyPresent;
		}
		entries.push(identity);
		AddOutcome::Added
	}

	pub fn remove(&self, identity: &Username) -> RemoveOutcome {
		let mut entries = self.entries.write();
		match entries.iter().position(|e| e == identity) {
			Some(idx) => {
				entries.remove(idx);
				RemoveOutcome::Removed
			}
			None => RemoveOutcome::NotFound,
		}
	}

	/// Snapshot in insertion order.
	pub fn list(&self) -> Vec<Username> {
		self.entries.read().clone()
	}

	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
