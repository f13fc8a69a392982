#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use hush_core::InboundMessage;
use hush_domain::{ChatId, UserId, Username};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapters::sim::SimulatedPlatform;
use crate::server::dispatcher::OutboundReply;

/// A parsed console line.
#[derive(Debug, Clone)]
pub struct ConsoleLine {
	pub message: InboundMessage,
	pub first_name: Option<String>,
}

/// Parse one console line: `<chat_id> <user_id>[:<username>[:<first_name>]] <text>`.
///
/// Example: `-100 42:alice:Alice hello there`.
pub fn parse_line(line: &str) -> anyhow::Result<ConsoleLine> {
	let line = line.trim();
	let (chat_s, rest) = line.split_once(char::is_whitespace).ok_or_else(|| anyhow!("missing sender"))?;
	let (sender_s, text) = rest
		.trim_start()
		.split_once(char::is_whitespace)
		.ok_or_else(|| anyhow!("missing message text"))?;

	let chat: ChatId = chat_s.parse().context("chat id")?;
	let mut parts = sender_s.splitn(3, ':');
	let user_s = parts.next().unwrap_or_default();
	let username = parts.next().map(|n| Username::new(n).context("username")).transpose()?;
	let first_name = parts.next().filter(|n| !n.is_empty()).map(str::to_string);
	let sender: UserId = user_s.parse().context("user id")?;

	let text = text.trim();
	if text.is_empty() {
		return Err(anyhow!("message text must be non-empty"));
	}

	Ok(ConsoleLine {
		message: InboundMessage {
			chat,
			sender,
			sender_username: username,
			text: text.to_string(),
		},
		first_name,
	})
}

/// Read console lines until EOF and forward them as inbound messages.
///
/// Messages from members the platform has restricted are dropped here, the
/// way a real platform would refuse them.
pub async fn run_reader<R>(reader: R, platform: Arc<SimulatedPlatform>, tx: mpsc::Sender<InboundMessage>) -> anyhow::Result<()>
where
	R: AsyncBufRead + Unpin,
{
	info!("console transport started");
	let mut lines = reader.lines();

	while let Some(line) = lines.next_line().await.context("read console line")? {
		if line.trim().is_empty() || line.trim_start().starts_with('#') {
			continue;
		}

		let ConsoleLine { message: msg, first_name } = match parse_line(&line) {
			Ok(parsed) => parsed,
			Err(e) => {
				warn!(error = %format!("{e:#}"), "console: ignoring malformed line");
				continue;
			}
		};

		platform.observe(msg.chat, msg.sender, msg.sender_username.as_ref(), first_name.as_deref());
		if !platform.can_send(msg.chat, msg.sender) {
			info!(chat = %msg.chat, user = %msg.sender, "console: message refused, sender is muted");
			continue;
		}

		if tx.send(msg).await.is_err() {
			debug!("console: dispatcher closed; stopping reader");
			break;
		}
	}

	info!("console transport reached end of input");
	Ok(())
}

/// Write rendered replies, one `[chat] text` block per reply.
pub async fn run_writer<W>(mut writer: W, mut rx: mpsc::Receiver<OutboundReply>) -> anyhow::Result<()>
where
	W: AsyncWrite + Unpin,
{
	while let Some(reply) = rx.recv().await {
		let block = format!("[{}] {}\n", reply.chat, reply.text);
		writer.write_all(block.as_bytes()).await.context("write reply")?;
		writer.flush().await.context("flush reply")?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use tokio::io::BufReader;

	use super::*;
	use crate::config::SimulationSettings;

	#[test]
	fn parses_sender_with_and_without_username() {
		let line = parse_line("-100 42:@Alice hello  there").expect("parse");
		let msg = &line.message;
		assert_eq!(msg.chat, ChatId::new(-100));
		assert_eq!(msg.sender, UserId::new(42));
		assert_eq!(msg.sender_username.as_ref().map(Username::as_str), Some("Alice"));
		assert_eq!(msg.text, "hello  there");
		assert!(line.first_name.is_none());

		let line = parse_line("-100 43:bob:Bobby hi").expect("parse");
		assert_eq!(line.message.sender_username.as_ref().map(Username::as_str), Some("bob"));
		assert_eq!(line.first_name.as_deref(), Some("Bobby"));

		let line = parse_line("5 7 /showwhitelist").expect("parse");
		assert!(line.message.sender_username.is_none());
		assert_eq!(line.message.text, "/showwhitelist");
	}

	#[test]
	fn rejects_malformed_lines() {
		assert!(parse_line("").is_err());
		assert!(parse_line("-100").is_err());
		assert!(parse_line("-100 42").is_err());
		assert!(parse_line("abc 42 hi").is_err());
		assert!(parse_line("-100 x:bob hi").is_err());
	}

	#[tokio::test]
	async fn reader_skips_comments_and_muted_senders() {
		let platform = Arc::new(SimulatedPlatform::new(&SimulationSettings::default()));
		platform.observe(ChatId::new(-1), UserId::new(9), None, None);
		hush_core::ChatPlatform::restrict_send(platform.as_ref(), ChatId::new(-1), UserId::new(9))
			.await
			.expect("restrict");

		let input = "# comment\n\n-1 9:bob still here?\nnot a line\n-1 3:carol hi\n";
		let (tx, mut rx) = mpsc::channel(8);
		run_reader(BufReader::new(input.as_bytes()), Arc::clone(&platform), tx)
			.await
			.expect("reader");

		let msg = rx.recv().await.expect("one message");
		assert_eq!(msg.sender, UserId::new(3));
		assert!(rx.recv().await.is_none());
	}

	#[tokio::test]
	async fn writer_prefixes_chat_id() {
		let (tx, rx) = mpsc::channel(4);
		tx.send(OutboundReply {
			chat: ChatId::new(-1),
			text: "@bob has been muted.".to_string(),
		})
		.await
		.expect("send");
		drop(tx);

		let mut out = Vec::new();
		run_writer(&mut out, rx).await.expect("writer");
		assert_eq!(String::from_utf8(out).unwrap(), "[-1] @bob has been muted.\n");
	}
}
