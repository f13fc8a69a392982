#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use hush_core::{ChatPlatform, MemberProfile, PlatformError, SendPermissions};
use hush_domain::{ChatId, MemberStatus, UserId, Username};
use tracing::debug;

use crate::config::SimulationSettings;

#[derive(Debug, Clone)]
struct SimMember {
	username: Option<Username>,
	first_name: Option<String>,
	permissions: SendPermissions,
}

/// In-memory chat platform.
///
/// Members are learned from the messages they send. Negative chat ids are
/// group chats, matching the convention of the bot APIs this stands in for.
#[derive(Debug, Default)]
pub struct SimulatedPlatform {
	admins: HashSet<UserId>,
	latency: Option<Duration>,
	chats: DashMap<ChatId, HashMap<UserId, SimMember>>,
}

impl SimulatedPlatform {
	pub fn new(settings: &SimulationSettings) -> Self {
		Self {
			admins: settings.admins.iter().copied().collect(),
			latency: settings.latency,
			chats: DashMap::new(),
		}
	}

	/// Register (or refresh) a member seen in `chat`.
	pub fn observe(&self, chat: ChatId, user: UserId, username: Option<&Username>, first_name: Option<&str>) {
		let mut members = self.chats.entry(chat).or_default();
		let member = members.entry(user).or_insert_with(|| SimMember {
			username: None,
			first_name: None,
			permissions: SendPermissions::unrestricted(),
		});
		if username.is_some() {
			member.username = username.cloned();
		}
		if let Some(first_name) = first_name {
			member.first_name = Some(first_name.to_string());
		}
	}

	/// Whether the platform would deliver a message from `user`.
	pub fn can_send(&self, chat: ChatId, user: UserId) -> bool {
		self.permissions(chat, user).is_none_or(|p| p.can_send_messages)
	}

	pub fn permissions(&self, chat: ChatId, user: UserId) -> Option<SendPermissions> {
		self.chats
			.get(&chat)
			.and_then(|members| members.get(&user).map(|m| m.permissions))
	}

	async fn apply(&self, chat: ChatId, user: UserId, permissions: SendPermissions) -> Result<(), PlatformError> {
		if let Some(latency) = self.latency {
			tokio::time::sleep(latency).await;
		}

		let mut members = self
			.chats
			.get_mut(&chat)
			.ok_or_else(|| PlatformError::Internal(format!("chat {chat} not found")))?;
		let member = members
			.get_mut(&user)
			.ok_or_else(|| PlatformError::Internal(format!("user {user} is not a member of {chat}")))?;
		member.permissions = permissions;
		debug!(%chat, %user, can_send = permissions.can_send_messages, "simulated permissions applied");
		Ok(())
	}
}

#[async_trait]
impl ChatPlatform for SimulatedPlatform {
	async fn is_group_chat(&self, chat: ChatId) -> Result<bool, PlatformError> {
		Ok(chat.get() < 0)
	}

	async fn member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus, PlatformError> {
		if self.admins.contains(&user) {
			return Ok(MemberStatus::Administrator);
		}
		Ok(match self.permissions(chat, user) {
			Some(p) if !p.can_send_messages => MemberStatus::Restricted,
			Some(_) => MemberStatus::Member,
			None => MemberStatus::Left,
		})
	}

	async fn resolve_member_by_username(&self, chat: ChatId, username: &Username) -> Result<Option<UserId>, PlatformError> {
		Ok(self.chats.get(&chat).and_then(|members| {
			members
				.iter()
				.find(|(_, m)| m.username.as_ref() == Some(username))
				.map(|(id, _)| *id)
		}))
	}

	async fn restrict_send(&self, chat: ChatId, user: UserId) -> Result<(), PlatformError> {
		self.apply(chat, user, SendPermissions::muted()).await
	}

	async fn allow_send(&self, chat: ChatId, user: UserId) -> Result<(), PlatformError> {
		self.apply(chat, user, SendPermissions::unrestricted()).await
	}

	async fn member_profile(&self, chat: ChatId, user: UserId) -> Result<Option<MemberProfile>, PlatformError> {
		Ok(self.chats.get(&chat).and_then(|members| {
			members.get(&user).map(|m| MemberProfile {
				username: m.username.clone(),
				first_name: m.first_name.clone(),
			})
		}))
	}
}
