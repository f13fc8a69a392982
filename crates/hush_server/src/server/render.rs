#![forbid(unsafe_code)]

use std::fmt::Write as _;

use hush_core::{CommandKind, ModerationError, Reply, ToggleOutcome};

/// Render a structured reply as chat text.
pub fn render(reply: &Reply) -> String {
	match reply {
		Reply::MuteAll(ToggleOutcome::Activated { .. }) => {
			"Mute all has been activated. All members except those in the whitelist will be muted.".to_string()
		}
		Reply::MuteAll(ToggleOutcome::Deactivated(report)) => {
			let mut out = "Mute all has been deactivated. Unmuting all previously muted users.".to_string();
			if !report.failures.is_empty() {
				let _ = write!(out, "\nCould not unmute {} user(s):", report.failures.len());
				for failure in &report.failures {
					let _ = write!(out, "\n- User ID: {} ({})", failure.user, failure.reason);
				}
			}
			out
		}
		Reply::Muted { username } => format!("@{username} has been muted."),
		Reply::MuteNotReverted { username, reason } => format!(
			"Mute all was turned off while @{username} was being muted, and lifting the mute failed ({reason}). Use /unmute {username} to retry."
		),
		Reply::Unmuted { username } => format!("@{username} has been unmuted."),
		Reply::WhitelistAdded(username) => format!("@{username} has been added to the whitelist."),
		Reply::WhitelistRemoved(username) => format!("@{username} has been removed from the whitelist."),
		Reply::Whitelist(entries) if entries.is_empty() => "The whitelist is empty.".to_string(),
		Reply::Whitelist(entries) => {
			let mut out = "Current whitelist:".to_string();
			for entry in entries {
				let _ = write!(out, "\n@{entry}");
			}
			out
		}
		Reply::MutedMembers(members) if members.is_empty() => "There are no muted members in this group.".to_string(),
		Reply::MutedMembers(members) => {
			let mut out = "Muted members in this group:".to_string();
			for m in members {
				match &m.profile {
					Some(profile) => {
						let first_name = profile.first_name.as_deref().unwrap_or("No first name");
						match &profile.username {
							Some(username) => {
								let _ = write!(out, "\n- @{username} (ID: {}, Name: {first_name})", m.user);
							}
							None => {
								let _ = write!(out, "\n- (no username) (ID: {}, Name: {first_name})", m.user);
							}
						}
					}
					None => {
						let _ = write!(out, "\n- User ID: {} (Unable to fetch details)", m.user);
					}
				}
			}
			out
		}
		Reply::MissingArgument(kind) => missing_argument(*kind),
		Reply::Failed { kind, error } => failed(*kind, error),
	}
}

fn missing_argument(kind: CommandKind) -> String {
	let purpose = match kind {
		CommandKind::UnmuteUser => "to unmute",
		CommandKind::AddWhitelist => "to add to the whitelist",
		CommandKind::RemoveWhitelist => "to remove from the whitelist",
		other => return format!("{other} takes no arguments."),
	};
	format!("Please provide a username {purpose}.")
}

fn failed(kind: CommandKind, error: &ModerationError) -> String {
	match error {
		ModerationError::PermissionDenied => "Only administrators can use this command.".to_string(),
		ModerationError::WrongContext => "This command can only be used in groups.".to_string(),
		ModerationError::UserNotFound(username) => format!("Couldn't find user @{username} in this chat."),
		ModerationError::AlreadyPresent(username) => format!("@{username} is already in the whitelist."),
		ModerationError::NotFound(username) => format!("@{username} is not in the whitelist."),
		ModerationError::EnforcementFailed(reason) => {
			format!("An error occurred while running {kind}: {reason}")
		}
		ModerationError::InvalidIdentity(e) => format!("That is not a valid username ({e})."),
		ModerationError::Lookup(reason) => format!("Could not check chat details, try again later ({reason})."),
	}
}
