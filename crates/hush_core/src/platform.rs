#![forbid(unsafe_code)]

use async_trait::async_trait;
use hush_domain::{ChatId, MemberStatus, UserId, Username};

use crate::error::PlatformError;

/// Send permissions applied by an enforcement intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendPermissions {
	pub can_send_messages: bool,
	pub can_send_media_messages: bool,
	pub can_send_other_messages: bool,
}

impl SendPermissions {
	/// Applied by `restrict_send`.
	pub const fn muted() -> Self {
		Self {
			can_send_messages: false,
			can_send_media_messages: false,
			can_send_other_messages: false,
		}
	}

	/// Applied by `allow_send`.
	pub const fn unrestricted() -> Self {
		Self {
			can_send_messages: true,
			can_send_media_messages: true,
			can_send_other_messages: true,
		}
	}
}

/// Public profile of a chat member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberProfile {
	pub username: Option<Username>,
	pub first_name: Option<String>,
}

/// Chat platform the engine consults and enforces through.
///
/// Every method is a network round-trip in a real deployment; the engine never
/// calls one while holding registry or whitelist locks.
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
	async fn is_group_chat(&self, chat: ChatId) -> Result<bool, PlatformError>;

	async fn member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus, PlatformError>;

	/// Exact, case-insensitive lookup. `None` when no member carries the handle.
	async fn resolve_member_by_username(&self, chat: ChatId, username: &Username) -> Result<Option<UserId>, PlatformError>;

	/// Apply `SendPermissions::muted()` to the member.
	async fn restrict_send(&self, chat: ChatId, user: UserId) -> Result<(), PlatformError>;

	/// Apply `SendPermissions::unrestricted()` to the member.
	async fn allow_send(&self, chat: ChatId, user: UserId) -> Result<(), PlatformError>;

	/// `None` when the user is not a member of the chat.
	async fn member_profile(&self, chat: ChatId, user: UserId) -> Result<Option<MemberProfile>, PlatformError>;
}
