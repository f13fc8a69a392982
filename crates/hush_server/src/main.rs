#![forbid(unsafe_code)]

mod adapters;
mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use hush_core::{ChatPlatform, CommandRouter, ModerationEngine, MuteRegistry, WhitelistStore};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::adapters::SimulatedPlatform;
use crate::adapters::console::{run_reader, run_writer};
use crate::server::dispatcher::{Dispatcher, DispatcherConfig};

const CHANNEL_CAPACITY: usize = 256;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: hush_server [--config path]\n\
\n\
Reads chat messages from stdin, one per line:\n\
\t<chat_id> <user_id>[:<username>[:<first_name>]] <text>\n\
Negative chat ids are groups. Replies are written to stdout.\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.hush/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> Option<PathBuf> {
	let mut config_path = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				config_path = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	config_path
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hush_server=debug,hush_core=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	// stdout carries replies; logs go to stderr.
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(
			tracing_subscriber::fmt::layer()
				.with_target(false)
				.with_writer(std::io::stderr),
		);

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("hush_server");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let config_path = match parse_args() {
		Some(path) => path,
		None => crate::config::default_config_path()?,
	};
	let cfg = crate::config::load_server_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded server config (toml + env overrides)");

	init_metrics(cfg.server.metrics_bind.as_deref());

	let platform = Arc::new(SimulatedPlatform::new(&cfg.simulation));
	let whitelist = Arc::new(WhitelistStore::with_entries(cfg.whitelist.initial.iter().cloned()));
	info!(
		entries = whitelist.len(),
		admins = cfg.simulation.admins.len(),
		"moderation state initialized"
	);

	let engine = ModerationEngine::new(
		Arc::clone(&platform) as Arc<dyn ChatPlatform>,
		Arc::new(MuteRegistry::new()),
		whitelist,
		cfg.moderation.engine_config(),
	);
	let router = CommandRouter::new(engine);

	let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
	let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);

	let reader = tokio::spawn(run_reader(BufReader::new(tokio::io::stdin()), Arc::clone(&platform), in_tx));
	let writer = tokio::spawn(run_writer(tokio::io::stdout(), out_rx));

	let dispatcher = Dispatcher::new(router, out_tx, DispatcherConfig::default());

	let shutdown = async {
		match tokio::signal::ctrl_c().await {
			Ok(()) => info!("shutdown requested"),
			Err(e) => {
				warn!(error = %e, "failed to listen for ctrl-c");
				std::future::pending::<()>().await;
			}
		}
	};
	dispatcher.run_until(in_rx, shutdown).await;
	reader.abort();

	match reader.await {
		Ok(Err(e)) => warn!(error = %format!("{e:#}"), "console reader failed"),
		Ok(Ok(())) => {}
		Err(e) if e.is_cancelled() => {}
		Err(e) => warn!(error = %e, "console reader task failed"),
	}

	// All reply senders are gone once the dispatcher is dropped, so the writer drains and exits.
	writer.await??;

	info!("hush_server stopped");
	Ok(())
}
