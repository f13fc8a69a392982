#![forbid(unsafe_code)]

use std::sync::Arc;

use hush_core::{CommandRouter, InboundMessage};
use hush_domain::ChatId;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::server::render::render;

/// Settings for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
	/// Maximum messages handled concurrently.
	pub max_in_flight: usize,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self { max_in_flight: 64 }
	}
}

/// Rendered reply addressed to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
	pub chat: ChatId,
	pub text: String,
}

/// Consumes inbound messages and runs each through the router on its own task.
///
/// Messages are handled concurrently, including messages from the same chat,
/// so they can complete out of arrival order. A message sent right after
/// `/togglemute` may still be checked against the previous mute-all state.
pub struct Dispatcher {
	router: CommandRouter,
	replies: mpsc::Sender<OutboundReply>,
	cfg: DispatcherConfig,
}

impl Dispatcher {
	pub fn new(router: CommandRouter, replies: mpsc::Sender<OutboundReply>, cfg: DispatcherConfig) -> Self {
		Self { router, replies, cfg }
	}

	/// Run until the inbound channel closes, then wait for in-flight messages.
	pub async fn run(self, inbound: mpsc::Receiver<InboundMessage>) {
		self.run_until(inbound, std::future::pending::<()>()).await;
	}

	/// Like `run`, but also stops taking new messages once `shutdown` resolves.
	///
	/// Messages already dispatched always run to completion, so a deactivation
	/// sweep in flight still lifts every mute it started on.
	pub async fn run_until<S>(self, mut inbound: mpsc::Receiver<InboundMessage>, shutdown: S)
	where
		S: Future<Output = ()>,
	{
		info!(max_in_flight = self.cfg.max_in_flight, "dispatcher started");

		let limit = Arc::new(Semaphore::new(self.cfg.max_in_flight.max(1)));
		let mut tasks = JoinSet::new();
		let mut shutdown = std::pin::pin!(shutdown);

		loop {
			let msg = tokio::select! {
				biased;
				() = &mut shutdown => {
					info!(in_flight = tasks.len(), "dispatcher: shutdown requested; draining");
					break;
				}
				msg = inbound.recv() => match msg {
					Some(msg) => msg,
					None => break,
				},
			};

			metrics::counter!("hush_inbound_messages_total").increment(1);
			let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
				break;
			};

			let router = self.router.clone();
			let replies = self.replies.clone();
			tasks.spawn(async move {
				let _permit = permit;
				let Some(reply) = router.handle(&msg).await else {
					return;
				};

				let out = OutboundReply {
					chat: msg.chat,
					text: render(&reply),
				};
				if replies.send(out).await.is_err() {
					debug!(chat = %msg.chat, "reply channel closed; dropping reply");
				}
			});

			while let Some(res) = tasks.try_join_next() {
				log_join(res);
			}
		}

		while let Some(res) = tasks.join_next().await {
			log_join(res);
		}

		info!("dispatcher stopped");
	}
}

fn log_join(res: Result<(), tokio::task::JoinError>) {
	if let Err(e) = res {
		warn!(error = %e, "dispatch task failed");
	}
}
