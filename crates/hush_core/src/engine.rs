#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use hush_domain::{ChatId, UserId, Username};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{ModerationError, PlatformError};
use crate::platform::{ChatPlatform, MemberProfile};
use crate::registry::{MuteRegistry, Toggle};
use crate::whitelist::{AddOutcome, RemoveOutcome, WhitelistStore};

/// Configuration for `ModerationEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Upper bound for every platform call; an expired call counts as failed.
	pub enforcement_timeout: Duration,

	/// Maximum unmute intents in flight during a deactivation sweep.
	pub sweep_concurrency: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			enforcement_timeout: Duration::from_secs(10),
			sweep_concurrency: 8,
		}
	}
}

/// Result of `ModerationEngine::toggle_mute_all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
	/// Chat is now locked. `cleared` counts stale registry entries dropped.
	Activated { cleared: usize },

	/// Chat is open again.
	Deactivated(SweepReport),
}

/// Per-user outcomes of a deactivation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
	pub unmuted: Vec<UserId>,

	/// Users whose unmute failed. They stay recorded as muted.
	pub failures: Vec<UnmuteFailure>,
}

impl SweepReport {
	pub fn is_complete(&self) -> bool {
		self.failures.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmuteFailure {
	pub user: UserId,
	pub reason: PlatformError,
}

/// Result of `ModerationEngine::on_incoming_message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
	/// Mute-all is off for the chat.
	Open,

	/// Sender is whitelisted.
	Exempt,

	/// Sender has no username and cannot be matched against the whitelist.
	Anonymous,

	/// Mute confirmed and recorded.
	Muted,

	/// Mute-all ended while the mute was in flight; the mute was undone.
	Reverted,

	/// Mute-all ended while the mute was in flight and undoing it failed.
	/// The user stays recorded as muted.
	RevertFailed(PlatformError),

	MuteFailed(PlatformError),
}

/// Result of `ModerationEngine::unmute_user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unmuted {
	pub user: UserId,

	/// Whether the registry had the user recorded as muted.
	pub was_recorded: bool,
}

/// Row returned by `ModerationEngine::list_muted_members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutedMember {
	pub user: UserId,

	/// `None` when the profile could not be fetched.
	pub profile: Option<MemberProfile>,
}

#[derive(Debug, Clone, Copy)]
enum Intent {
	Mute,
	Unmute,
}

impl Intent {
	const fn as_str(self) -> &'static str {
		match self {
			Intent::Mute => "mute",
			Intent::Unmute => "unmute",
		}
	}
}

/// Per-chat mute-all state machine.
///
/// Every entry point follows the same discipline: decide under the registry
/// lock, release it, await the platform call, then relock to record the
/// confirmed outcome.
#[derive(Clone)]
pub struct ModerationEngine {
	platform: Arc<dyn ChatPlatform>,
	registry: Arc<MuteRegistry>,
	whitelist: Arc<WhitelistStore>,
	cfg: EngineConfig,
}

impl ModerationEngine {
	pub fn new(
		platform: Arc<dyn ChatPlatform>,
		registry: Arc<MuteRegistry>,
		whitelist: Arc<WhitelistStore>,
		cfg: EngineConfig,
	) -> Self {
		Self {
			platform,
			registry,
			whitelist,
			cfg,
		}
	}

	pub fn registry(&self) -> &MuteRegistry {
		&self.registry
	}

	/// Switch a chat between open and locked.
	pub async fn toggle_mute_all(&self, chat: ChatId, requester_is_admin: bool) -> Result<ToggleOutcome, ModerationError> {
		self.authorize(chat, requester_is_admin).await?;

		match self.registry.toggle(chat) {
			Toggle::Activated { cleared } => {
				if !cleared.is_empty() {
					warn!(%chat, stale = cleared.len(), "mute-all: dropped stale muted users on activation");
				}
				info!(%chat, "mute-all activated");
				Ok(ToggleOutcome::Activated { cleared: cleared.len() })
			}
			Toggle::Deactivated { to_unmute } => {
				info!(%chat, pending = to_unmute.len(), "mute-all deactivated; sweeping muted users");
				let report = self.sweep(chat, to_unmute).await;
				self.registry.prune(chat);
				if !report.is_complete() {
					warn!(
						%chat,
						unmuted = report.unmuted.len(),
						failed = report.failures.len(),
						"mute-all sweep finished with failures"
					);
				}
				Ok(ToggleOutcome::Deactivated(report))
			}
		}
	}

	/// Message-intercept path. Never fails; enforcement problems are in the outcome.
	pub async fn on_incoming_message(&self, chat: ChatId, sender: Option<&Username>, sender_id: UserId) -> MessageOutcome {
		if !self.registry.is_locked(chat) {
			return MessageOutcome::Open;
		}

		let Some(sender) = sender else {
			debug!(%chat, user = %sender_id, "mute-all: sender has no username; skipping");
			return MessageOutcome::Anonymous;
		};

		if self.whitelist.contains(sender) {
			return MessageOutcome::Exempt;
		}

		if let Err(e) = self.run_intent(chat, sender_id, Intent::Mute).await {
			warn!(%chat, user = %sender_id, username = %sender, error = %e, "failed to mute user");
			return MessageOutcome::MuteFailed(e);
		}

		if self.registry.record_muted_if_locked(chat, sender_id) {
			info!(%chat, user = %sender_id, username = %sender, "muted user");
			return MessageOutcome::Muted;
		}

		// Deactivated while the mute was in flight.
		match self.run_intent(chat, sender_id, Intent::Unmute).await {
			Ok(()) => {
				info!(%chat, user = %sender_id, "reverted mute that landed after deactivation");
				MessageOutcome::Reverted
			}
			Err(e) => {
				warn!(
					%chat,
					user = %sender_id,
					error = %e,
					"could not revert late mute; keeping it recorded"
				);
				self.registry.record_muted(chat, sender_id);
				MessageOutcome::RevertFailed(e)
			}
		}
	}

	/// Lift the restriction of a single member, looked up by username.
	pub async fn unmute_user(
		&self,
		chat: ChatId,
		requester_is_admin: bool,
		target: &Username,
	) -> Result<Unmuted, ModerationError> {
		self.authorize(chat, requester_is_admin).await?;

		let user = self
			.bounded(self.platform.resolve_member_by_username(chat, target))
			.await
			.map_err(ModerationError::Lookup)?
			.ok_or_else(|| ModerationError::UserNotFound(target.clone()))?;

		match self.run_intent(chat, user, Intent::Unmute).await {
			Ok(()) => {
				let was_recorded = self.registry.record_unmuted(chat, user);
				info!(%chat, %user, username = %target, was_recorded, "unmuted user");
				Ok(Unmuted { user, was_recorded })
			}
			Err(e) => {
				warn!(%chat, %user, username = %target, error = %e, "failed to unmute user");
				Err(ModerationError::EnforcementFailed(e))
			}
		}
	}

	/// Muted members of a chat with their profiles, ordered by user id.
	pub async fn list_muted_members(
		&self,
		chat: ChatId,
		requester_is_admin: bool,
	) -> Result<Vec<MutedMember>, ModerationError> {
		self.authorize(chat, requester_is_admin).await?;

		let muted = self.registry.list_muted(chat);
		let this = self;
		let members = stream::iter(muted)
			.map(move |user| async move {
				let profile = match this.bounded(this.platform.member_profile(chat, user)).await {
					Ok(Some(mut profile)) => {
						profile.first_name = profile.first_name.filter(|n| !n.trim().is_empty());
						Some(profile)
					}
					Ok(None) => {
						debug!(%chat, %user, "muted user is no longer a member");
						None
					}
					Err(e) => {
						warn!(%chat, %user, error = %e, "could not fetch member profile");
						None
					}
				};
				MutedMember { user, profile }
			})
			.buffered(self.fan_out())
			.collect::<Vec<_>>()
			.await;

		Ok(members)
	}

	pub async fn add_whitelist(
		&self,
		chat: ChatId,
		requester_is_admin: bool,
		identity: Username,
	) -> Result<(), ModerationError> {
		self.authorize(chat, requester_is_admin).await?;

		match self.whitelist.add(identity.clone()) {
			AddOutcome::Added => {
				info!(%chat, username = %identity, "whitelist: added");
				Ok(())
			}
			AddOutcome::AlreadyPresent => Err(ModerationError::AlreadyPresent(identity)),
		}
	}

	pub async fn remove_whitelist(
		&self,
		chat: ChatId,
		requester_is_admin: bool,
		identity: &Username,
	) -> Result<(), ModerationError> {
		self.authorize(chat, requester_is_admin).await?;

		match self.whitelist.remove(identity) {
			RemoveOutcome::Removed => {
				info!(%chat, username = %identity, "whitelist: removed");
				Ok(())
			}
			RemoveOutcome::NotFound => Err(ModerationError::NotFound(identity.clone())),
		}
	}

	/// Resolve whether `user` may issue moderation commands in `chat`.
	///
	/// Fails with `WrongContext` outside group chats before any member lookup.
	pub async fn resolve_requester(&self, chat: ChatId, user: UserId) -> Result<bool, ModerationError> {
		self.ensure_group(chat).await?;
		let status = self
			.bounded(self.platform.member_status(chat, user))
			.await
			.map_err(ModerationError::Lookup)?;
		debug!(%chat, %user, %status, "resolved requester status");
		Ok(status.is_admin())
	}

	/// Open to every member.
	pub fn list_whitelist(&self) -> Vec<Username> {
		self.whitelist.list()
	}

	/// Group context first, then admin status.
	async fn authorize(&self, chat: ChatId, requester_is_admin: bool) -> Result<(), ModerationError> {
		self.ensure_group(chat).await?;
		if !requester_is_admin {
			return Err(ModerationError::PermissionDenied);
		}
		Ok(())
	}

	async fn ensure_group(&self, chat: ChatId) -> Result<(), ModerationError> {
		let is_group = self
			.bounded(self.platform.is_group_chat(chat))
			.await
			.map_err(ModerationError::Lookup)?;
		if !is_group {
			return Err(ModerationError::WrongContext);
		}
		Ok(())
	}

	async fn sweep(&self, chat: ChatId, users: BTreeSet<UserId>) -> SweepReport {
		let this = self;
		let mut results = stream::iter(users)
			.map(move |user| async move { (user, this.run_intent(chat, user, Intent::Unmute).await) })
			.buffer_unordered(self.fan_out());

		let mut report = SweepReport::default();
		while let Some((user, result)) = results.next().await {
			match result {
				Ok(()) => {
					self.registry.record_unmuted(chat, user);
					report.unmuted.push(user);
				}
				Err(reason) => {
					warn!(%chat, %user, error = %reason, "failed to unmute user during sweep");
					report.failures.push(UnmuteFailure { user, reason });
				}
			}
		}

		report.unmuted.sort();
		report.failures.sort_by_key(|f| f.user);
		report
	}

	async fn run_intent(&self, chat: ChatId, user: UserId, intent: Intent) -> Result<(), PlatformError> {
		let call = match intent {
			Intent::Mute => self.platform.restrict_send(chat, user),
			Intent::Unmute => self.platform.allow_send(chat, user),
		};

		let result = self.bounded(call).await;
		let outcome = if result.is_ok() { "ok" } else { "failed" };
		metrics::counter!("hush_enforcement_intents_total", "intent" => intent.as_str(), "outcome" => outcome).increment(1);
		result
	}

	async fn bounded<T>(&self, call: impl Future<Output = Result<T, PlatformError>>) -> Result<T, PlatformError> {
		match timeout(self.cfg.enforcement_timeout, call).await {
			Ok(result) => result,
			Err(_) => Err(PlatformError::Timeout(self.cfg.enforcement_timeout)),
		}
	}

	fn fan_out(&self) -> usize {
		self.cfg.sweep_concurrency.max(1)
	}
}
