#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use dashmap::DashMap;
use hush_domain::{ChatId, UserId};

/// Moderation state of a single chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatModerationState {
	/// New non-whitelisted senders get muted while set.
	pub mute_all_active: bool,

	/// Users muted by this system and not yet unmuted.
	pub muted_users: BTreeSet<UserId>,
}

impl ChatModerationState {
	/// Equivalent to having no entry at all.
	pub fn is_default(&self) -> bool {
		!self.mute_all_active && self.muted_users.is_empty()
	}
}

/// Flag transition performed by `MuteRegistry::toggle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
	/// Open -> Locked. `cleared` holds stale entries dropped by the reset.
	Activated { cleared: BTreeSet<UserId> },

	/// Locked -> Open. `to_unmute` is the snapshot the caller must sweep.
	Deactivated { to_unmute: BTreeSet<UserId> },
}

/// Owner of every `ChatModerationState`.
///
/// Entries live in a sharded map; each operation holds the shard lock for the
/// chat only for the duration of the call.
#[derive(Debug, Default)]
pub struct MuteRegistry {
	chats: DashMap<ChatId, ChatModerationState>,
}

impl MuteRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Snapshot of the chat state. Absent chats read as default and are not created.
	pub fn state(&self, chat: ChatId) -> ChatModerationState {
		self.chats.get(&chat).map(|s| s.clone()).unwrap_or_default()
	}

	pub fn is_locked(&self, chat: ChatId) -> bool {
		self.chats.get(&chat).is_some_and(|s| s.mute_all_active)
	}

	/// Set the mute-all flag. Leaves `muted_users` untouched in both directions.
	pub fn set_mute_all(&self, chat: ChatId, active: bool) {
		if active {
			self.chats.entry(chat).or_default().mute_all_active = true;
			return;
		}

		if let Some(mut s) = self.chats.get_mut(&chat) {
			s.mute_all_active = false;
		}
		self.prune(chat);
	}

	/// Flip the flag, reading the previous value under the same lock.
	pub fn toggle(&self, chat: ChatId) -> Toggle {
		let mut entry = self.chats.entry(chat).or_default();
		if entry.mute_all_active {
			entry.mute_all_active = false;
			Toggle::Deactivated {
				to_unmute: entry.muted_users.clone(),
			}
		} else {
			entry.mute_all_active = true;
			Toggle::Activated {
				cleared: std::mem::take(&mut entry.muted_users),
			}
		}
	}

	/// Returns `true` if the user was not yet recorded.
	pub fn record_muted(&self, chat: ChatId, user: UserId) -> bool {
		self.chats.entry(chat).or_default().muted_users.insert(user)
	}

	/// Record a confirmed mute only while the chat is still locked.
	///
	/// Returns `false` (and records nothing) when mute-all was switched off
	/// after the mute was decided.
	pub fn record_muted_if_locked(&self, chat: ChatId, user: UserId) -> bool {
		match self.chats.get_mut(&chat) {
			Some(mut s) if s.mute_all_active => {
				s.muted_users.insert(user);
				true
			}
			_ => false,
		}
	}

	/// Returns `true` if the user was recorded before.
	pub fn record_unmuted(&self, chat: ChatId, user: UserId) -> bool {
		let removed = match self.chats.get_mut(&chat) {
			Some(mut s) => s.muted_users.remove(&user),
			None => false,
		};
		self.prune(chat);
		removed
	}

	pub fn list_muted(&self, chat: ChatId) -> BTreeSet<UserId> {
		self.chats.get(&chat).map(|s| s.muted_users.clone()).unwrap_or_default()
	}

	/// Drop the entry for `chat` if it holds only defaults.
	pub fn prune(&self, chat: ChatId) {
		self.chats.remove_if(&chat, |_, s| s.is_default());
	}

	/// Number of chats with materialized state.
	pub fn chat_count(&self) -> usize {
		self.chats.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const CHAT: ChatId = ChatId::new(-100);

	#[test]
	fn reads_do_not_materialize_state() {
		let reg = MuteRegistry::new();
		assert_eq!(reg.state(CHAT), ChatModerationState::default());
		assert!(reg.list_muted(CHAT).is_empty());
		assert!(!reg.is_locked(CHAT));
		assert_eq!(reg.chat_count(), 0);
	}

	#[test]
	fn record_is_idempotent() {
		let reg = MuteRegistry::new();
		assert!(reg.record_muted(CHAT, UserId::new(1)));
		assert!(!reg.record_muted(CHAT, UserId::new(1)));
		assert_eq!(reg.list_muted(CHAT).len(), 1);

		assert!(reg.record_unmuted(CHAT, UserId::new(1)));
		assert!(!reg.record_unmuted(CHAT, UserId::new(1)));
		assert_eq!(reg.chat_count(), 0, "default state should be pruned");
	}

	#[test]
	fn set_mute_all_false_keeps_muted_users() {
		let reg = MuteRegistry::new();
		reg.set_mute_all(CHAT, true);
		reg.record_muted(CHAT, UserId::new(7));
		reg.set_mute_all(CHAT, false);

		let state = reg.state(CHAT);
		assert!(!state.mute_all_active);
		assert!(state.muted_users.contains(&UserId::new(7)));
	}

	#[test]
	fn toggle_clears_stale_entries_on_activation() {
		let reg = MuteRegistry::new();
		reg.record_muted(CHAT, UserId::new(3));

		match reg.toggle(CHAT) {
			Toggle::Activated { cleared } => assert!(cleared.contains(&UserId::new(3))),
			other => panic!("expected activation, got {other:?}"),
		}
		assert!(reg.is_locked(CHAT));
		assert!(reg.list_muted(CHAT).is_empty());

		reg.record_muted(CHAT, UserId::new(4));
		match reg.toggle(CHAT) {
			Toggle::Deactivated { to_unmute } => assert_eq!(to_unmute.into_iter().collect::<Vec<_>>(), vec![UserId::new(4)]),
			other => panic!("expected deactivation, got {other:?}"),
		}
		assert!(!reg.is_locked(CHAT));
		assert_eq!(reg.list_muted(CHAT).len(), 1, "toggle leaves the sweep to the caller");
	}

	#[test]
	fn conditional_record_respects_flag() {
		let reg = MuteRegistry::new();
		assert!(!reg.record_muted_if_locked(CHAT, UserId::new(1)));
		reg.set_mute_all(CHAT, true);
		assert!(reg.record_muted_if_locked(CHAT, UserId::new(1)));
		reg.set_mute_all(CHAT, false);
		assert!(!reg.record_muted_if_locked(CHAT, UserId::new(2)));
		assert_eq!(reg.list_muted(CHAT).into_iter().collect::<Vec<_>>(), vec![UserId::new(1)]);
	}
}
