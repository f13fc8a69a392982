#![forbid(unsafe_code)]

use std::fmt;

use hush_domain::{ChatId, ParseIdError, UserId, Username};
use thiserror::Error;
use tracing::debug;

use crate::engine::{MessageOutcome, ModerationEngine, MutedMember, ToggleOutcome};
use crate::error::{ModerationError, PlatformError};

/// User-facing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
	ToggleMuteAll,
	UnmuteUser,
	AddWhitelist,
	RemoveWhitelist,
	ListWhitelist,
	ListMutedMembers,
}

impl CommandKind {
	pub const ALL: [CommandKind; 6] = [
		CommandKind::ToggleMuteAll,
		CommandKind::UnmuteUser,
		CommandKind::AddWhitelist,
		CommandKind::RemoveWhitelist,
		CommandKind::ListWhitelist,
		CommandKind::ListMutedMembers,
	];

	/// Command word as typed after the `/`.
	pub const fn name(self) -> &'static str {
		match self {
			CommandKind::ToggleMuteAll => "togglemute",
			CommandKind::UnmuteUser => "unmute",
			CommandKind::AddWhitelist => "addwhitelist",
			CommandKind::RemoveWhitelist => "removewhitelist",
			CommandKind::ListWhitelist => "showwhitelist",
			CommandKind::ListMutedMembers => "showmuted",
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|k| k.name().eq_ignore_ascii_case(name))
	}

	pub const fn takes_username(self) -> bool {
		matches!(
			self,
			CommandKind::UnmuteUser | CommandKind::AddWhitelist | CommandKind::RemoveWhitelist
		)
	}
}

impl fmt::Display for CommandKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "/{}", self.name())
	}
}

/// Parsed command with its argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	ToggleMuteAll,
	UnmuteUser(Username),
	AddWhitelist(Username),
	RemoveWhitelist(Username),
	ListWhitelist,
	ListMutedMembers,
}

impl Command {
	pub fn kind(&self) -> CommandKind {
		match self {
			Command::ToggleMuteAll => CommandKind::ToggleMuteAll,
			Command::UnmuteUser(_) => CommandKind::UnmuteUser,
			Command::AddWhitelist(_) => CommandKind::AddWhitelist,
			Command::RemoveWhitelist(_) => CommandKind::RemoveWhitelist,
			Command::ListWhitelist => CommandKind::ListWhitelist,
			Command::ListMutedMembers => CommandKind::ListMutedMembers,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCommandError {
	#[error("unknown command: /{0}")]
	Unknown(String),

	#[error("{0} needs a username")]
	MissingArgument(CommandKind),

	#[error("{kind}: {source}")]
	InvalidArgument {
		kind: CommandKind,
		#[source]
		source: ParseIdError,
	},
}

/// Parse a chat message as a command.
///
/// Returns `None` for plain text. A `@botname` suffix on the command word is
/// ignored and only the first argument is used.
pub fn parse_command(text: &str) -> Option<Result<Command, ParseCommandError>> {
	let rest = text.trim_start().strip_prefix('/')?;
	let mut words = rest.split_whitespace();

	let word = words.next().unwrap_or_default();
	let name = word.split_once('@').map_or(word, |(name, _bot)| name);
	let Some(kind) = CommandKind::from_name(name) else {
		return Some(Err(ParseCommandError::Unknown(name.to_string())));
	};

	if !kind.takes_username() {
		return Some(Ok(match kind {
			CommandKind::ToggleMuteAll => Command::ToggleMuteAll,
			CommandKind::ListWhitelist => Command::ListWhitelist,
			_ => Command::ListMutedMembers,
		}));
	}

	let Some(arg) = words.next() else {
		return Some(Err(ParseCommandError::MissingArgument(kind)));
	};
	let username = match Username::new(arg) {
		Ok(u) => u,
		Err(source) => return Some(Err(ParseCommandError::InvalidArgument { kind, source })),
	};

	Some(Ok(match kind {
		CommandKind::UnmuteUser => Command::UnmuteUser(username),
		CommandKind::AddWhitelist => Command::AddWhitelist(username),
		_ => Command::RemoveWhitelist(username),
	}))
}

/// A chat message as delivered by the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
	pub chat: ChatId,
	pub sender: UserId,
	pub sender_username: Option<Username>,
	pub text: String,
}

/// Structured reply for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
	MuteAll(ToggleOutcome),
	Muted { username: Username },
	/// A mute landed after mute-all ended and could not be lifted.
	MuteNotReverted { username: Username, reason: PlatformError },
	Unmuted { username: Username },
	WhitelistAdded(Username),
	WhitelistRemoved(Username),
	Whitelist(Vec<Username>),
	MutedMembers(Vec<MutedMember>),
	MissingArgument(CommandKind),
	Failed { kind: CommandKind, error: ModerationError },
}

/// Maps chat messages onto engine entry points.
#[derive(Clone)]
pub struct CommandRouter {
	engine: ModerationEngine,
}

impl CommandRouter {
	pub fn new(engine: ModerationEngine) -> Self {
		Self { engine }
	}

	pub fn engine(&self) -> &ModerationEngine {
		&self.engine
	}

	/// Handle one message. `None` means nothing should be sent back.
	pub async fn handle(&self, msg: &InboundMessage) -> Option<Reply> {
		match parse_command(&msg.text) {
			None => self.intercept(msg).await,
			Some(Ok(cmd)) => Some(self.dispatch(msg, cmd).await),
			Some(Err(ParseCommandError::Unknown(name))) => {
				debug!(chat = %msg.chat, command = %name, "ignoring unknown command");
				None
			}
			Some(Err(ParseCommandError::MissingArgument(kind))) => Some(Reply::MissingArgument(kind)),
			Some(Err(ParseCommandError::InvalidArgument { kind, source })) => Some(Reply::Failed {
				kind,
				error: ModerationError::InvalidIdentity(source),
			}),
		}
	}

	async fn intercept(&self, msg: &InboundMessage) -> Option<Reply> {
		let outcome = self
			.engine
			.on_incoming_message(msg.chat, msg.sender_username.as_ref(), msg.sender)
			.await;

		match outcome {
			MessageOutcome::Muted => msg.sender_username.clone().map(|username| Reply::Muted { username }),
			MessageOutcome::RevertFailed(reason) => msg
				.sender_username
				.clone()
				.map(|username| Reply::MuteNotReverted { username, reason }),
			_ => None,
		}
	}

	async fn dispatch(&self, msg: &InboundMessage, cmd: Command) -> Reply {
		let kind = cmd.kind();
		metrics::counter!("hush_commands_total", "command" => kind.name()).increment(1);
		debug!(chat = %msg.chat, user = %msg.sender, command = %kind, "dispatching command");

		let result = match cmd {
			Command::ListWhitelist => Ok(Reply::Whitelist(self.engine.list_whitelist())),
			cmd => match self.engine.resolve_requester(msg.chat, msg.sender).await {
				Ok(is_admin) => self.run_admin(msg.chat, is_admin, cmd).await,
				Err(e) => Err(e),
			},
		};

		result.unwrap_or_else(|error| Reply::Failed { kind, error })
	}

	async fn run_admin(&self, chat: ChatId, is_admin: bool, cmd: Command) -> Result<Reply, ModerationError> {
		let engine = &self.engine;
		match cmd {
			Command::ToggleMuteAll => engine.toggle_mute_all(chat, is_admin).await.map(Reply::MuteAll),
			Command::UnmuteUser(username) => engine
				.unmute_user(chat, is_admin, &username)
				.await
				.map(|_| Reply::Unmuted { username }),
			Command::AddWhitelist(username) => engine
				.add_whitelist(chat, is_admin, username.clone())
				.await
				.map(|()| Reply::WhitelistAdded(username)),
			Command::RemoveWhitelist(username) => engine
				.remove_whitelist(chat, is_admin, &username)
				.await
				.map(|()| Reply::WhitelistRemoved(username)),
			Command::ListMutedMembers => engine.list_muted_members(chat, is_admin).await.map(Reply::MutedMembers),
			Command::ListWhitelist => Ok(Reply::Whitelist(engine.list_whitelist())),
		}
	}
}
