#![forbid(unsafe_code)]

pub mod engine;
pub mod error;
pub mod platform;
pub mod registry;
pub mod router;
pub mod whitelist;

#[cfg(test)]
mod testing;



pub use engine::{
	EngineConfig, MessageOutcome, ModerationEngine, MutedMember, SweepReport, ToggleOutcome, UnmuteFailure, Unmuted,
};
pub use error::{ModerationError, PlatformError};
pub use platform::{ChatPlatform, MemberProfile, SendPermissions};
pub use registry::{ChatModerationState, MuteRegistry};
pub use router::{Command, CommandKind, CommandRouter, InboundMessage, ParseCommandError, Reply, parse_command};
pub use whitelist::{AddOutcome, RemoveOutcome, WhitelistStore};
