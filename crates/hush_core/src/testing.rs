#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hush_domain::{ChatId, MemberStatus, UserId, Username};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use crate::engine::{EngineConfig, ModerationEngine};
use crate::error::PlatformError;
use crate::platform::{ChatPlatform, MemberProfile};
use crate::registry::MuteRegistry;
use crate::whitelist::WhitelistStore;

pub(crate) const GROUP: ChatId = ChatId::new(-1001);
pub(crate) const PRIVATE: ChatId = ChatId::new(55);
pub(crate) const ADMIN: UserId = UserId::new(1);

pub(crate) fn name(s: &str) -> Username {
	Username::new(s).expect("valid username")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
	Restrict(ChatId, UserId),
	Allow(ChatId, UserId),
}

/// Scriptable platform that records every enforcement call.
#[derive(Default)]
pub(crate) struct MockPlatform {
	groups: Mutex<HashSet<ChatId>>,
	admins: Mutex<HashSet<UserId>>,
	members: Mutex<HashMap<ChatId, Vec<(Username, UserId)>>>,
	profiles: Mutex<HashMap<UserId, MemberProfile>>,
	failing_profiles: Mutex<HashSet<UserId>>,
	failing_restrict: Mutex<HashSet<UserId>>,
	failing_allow: Mutex<HashSet<UserId>>,
	failing_lookups: Mutex<bool>,
	failing_status: Mutex<bool>,
	status_lookups: AtomicUsize,
	calls: Mutex<Vec<Call>>,
	delay: Mutex<Option<Duration>>,
	restrict_gate: Mutex<Option<Arc<Semaphore>>>,
	restrict_started: Notify,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}

impl MockPlatform {
	/// One group chat with `ADMIN` as administrator.
	pub(crate) fn new() -> Arc<Self> {
		let p = Self::default();
		p.groups.lock().insert(GROUP);
		p.admins.lock().insert(ADMIN);
		Arc::new(p)
	}

	pub(crate) fn add_member(&self, chat: ChatId, username: &str, user: UserId) {
		self.members.lock().entry(chat).or_default().push((name(username), user));
	}

	pub(crate) fn set_profile(&self, user: UserId, username: Option<&str>, first_name: Option<&str>) {
		let profile = MemberProfile {
			username: username.map(name),
			first_name: first_name.map(str::to_string),
		};
		self.profiles.lock().insert(user, profile);
	}

	pub(crate) fn fail_profile(&self, user: UserId) {
		self.failing_profiles.lock().insert(user);
	}

	pub(crate) fn fail_restrict(&self, user: UserId) {
		self.failing_restrict.lock().insert(user);
	}

	pub(crate) fn fail_allow(&self, user: UserId) {
		self.failing_allow.lock().insert(user);
	}

	pub(crate) fn heal_allow(&self, user: UserId) {
		self.failing_allow.lock().remove(&user);
	}

	pub(crate) fn fail_lookups(&self) {
		*self.failing_lookups.lock() = true;
	}

	/// Fail `member_status` only; group checks keep working.
	pub(crate) fn fail_status_lookups(&self) {
		*self.failing_status.lock() = true;
	}

	pub(crate) fn status_lookups(&self) -> usize {
		self.status_lookups.load(Ordering::SeqCst)
	}

	pub(crate) fn set_delay(&self, delay: Duration) {
		*self.delay.lock() = Some(delay);
	}

	/// Hold every `restrict_send` until the returned semaphore gets permits.
	pub(crate) fn gate_restrict(&self) -> Arc<Semaphore> {
		let gate = Arc::new(Semaphore::new(0));
		*self.restrict_gate.lock() = Some(Arc::clone(&gate));
		gate
	}

	/// Resolves once a `restrict_send` call has started.
	pub(crate) async fn restrict_started(&self) {
		self.restrict_started.notified().await;
	}

	pub(crate) fn calls(&self) -> Vec<Call> {
		self.calls.lock().clone()
	}

	pub(crate) fn restrict_calls(&self) -> usize {
		self.calls().iter().filter(|c| matches!(c, Call::Restrict(..))).count()
	}

	pub(crate) fn allow_calls(&self) -> usize {
		self.calls().iter().filter(|c| matches!(c, Call::Allow(..))).count()
	}

	pub(crate) fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}

	async fn enforce(&self, call: Call, failing: bool) -> Result<(), PlatformError> {
		let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(now, Ordering::SeqCst);
		self.calls.lock().push(call);

		let delay = *self.delay.lock();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		self.in_flight.fetch_sub(1, Ordering::SeqCst);
		if failing {
			Err(PlatformError::Internal("mock refused".to_string()))
		} else {
			Ok(())
		}
	}

	fn lookup_guard(&self) -> Result<(), PlatformError> {
		if *self.failing_lookups.lock() {
			return Err(PlatformError::Internal("lookup unavailable".to_string()));
		}
		Ok(())
	}
}

#[async_trait]
impl ChatPlatform for MockPlatform {
	async fn is_group_chat(&self, chat: ChatId) -> Result<bool, PlatformError> {
		self.lookup_guard()?;
		Ok(self.groups.lock().contains(&chat))
	}

	async fn member_status(&self, _chat: ChatId, user: UserId) -> Result<MemberStatus, PlatformError> {
		self.status_lookups.fetch_add(1, Ordering::SeqCst);
		self.lookup_guard()?;
		if *self.failing_status.lock() {
			return Err(PlatformError::Internal("status unavailable".to_string()));
		}
		if self.admins.lock().contains(&user) {
			Ok(MemberStatus::Administrator)
		} else {
			Ok(MemberStatus::Member)
		}
	}

	async fn resolve_member_by_username(&self, chat: ChatId, username: &Username) -> Result<Option<UserId>, PlatformError> {
		self.lookup_guard()?;
		Ok(self
			.members
			.lock()
			.get(&chat)
			.and_then(|m| m.iter().find(|(n, _)| n == username).map(|(_, id)| *id)))
	}

	async fn restrict_send(&self, chat: ChatId, user: UserId) -> Result<(), PlatformError> {
		self.restrict_started.notify_one();
		let gate = self.restrict_gate.lock().clone();
		if let Some(gate) = gate {
			let _permit = gate.acquire().await.map_err(|e| PlatformError::Internal(e.to_string()))?;
		}
		let failing = self.failing_restrict.lock().contains(&user);
		self.enforce(Call::Restrict(chat, user), failing).await
	}

	async fn allow_send(&self, chat: ChatId, user: UserId) -> Result<(), PlatformError> {
		let failing = self.failing_allow.lock().contains(&user);
		self.enforce(Call::Allow(chat, user), failing).await
	}

	async fn member_profile(&self, _chat: ChatId, user: UserId) -> Result<Option<MemberProfile>, PlatformError> {
		if self.failing_profiles.lock().contains(&user) {
			return Err(PlatformError::Internal("profile lookup failed".to_string()));
		}
		Ok(self.profiles.lock().get(&user).cloned())
	}
}

pub(crate) fn engine_with(platform: &Arc<MockPlatform>, whitelist: &[&str], cfg: EngineConfig) -> ModerationEngine {
	let whitelist = WhitelistStore::with_entries(whitelist.iter().map(|s| name(s)));
	ModerationEngine::new(
		Arc::clone(platform) as Arc<dyn ChatPlatform>,
		Arc::new(MuteRegistry::new()),
		Arc::new(whitelist),
		cfg,
	)
}

pub(crate) fn engine(platform: &Arc<MockPlatform>, whitelist: &[&str]) -> ModerationEngine {
	engine_with(platform, whitelist, EngineConfig::default())
}
