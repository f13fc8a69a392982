#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use hush_core::EngineConfig;
use hush_domain::{UserId, Username};
use serde::Deserialize;
use tracing::{info, warn};

const DEFAULT_ENFORCEMENT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

/// Default config path: `~/.hush/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".hush").join("config.toml"))
}

/// Load the server config from TOML and `HUSH_*` env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);

	apply_overrides(&mut cfg, |key| std::env::var(key).ok());

	Ok(cfg)
}

/// Server config.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub moderation: ModerationSettings,
	pub whitelist: WhitelistSettings,
	pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModerationSettings {
	/// Timeout applied to every platform call.
	pub enforcement_timeout: Duration,
	/// Unmute intents in flight during a deactivation sweep.
	pub sweep_concurrency: usize,
}

impl Default for ModerationSettings {
	fn default() -> Self {
		Self {
			enforcement_timeout: Duration::from_millis(DEFAULT_ENFORCEMENT_TIMEOUT_MS),
			sweep_concurrency: DEFAULT_SWEEP_CONCURRENCY,
		}
	}
}

impl ModerationSettings {
	pub fn engine_config(&self) -> EngineConfig {
		EngineConfig {
			enforcement_timeout: self.enforcement_timeout,
			sweep_concurrency: self.sweep_concurrency,
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct WhitelistSettings {
	/// Seed entries, in order. Invalid handles are dropped with a warning.
	pub initial: Vec<Username>,
}

/// Settings of the in-memory platform used by the console transport.
#[derive(Debug, Clone, Default)]
pub struct SimulationSettings {
	/// Users reported as administrators in every group chat.
	pub admins: Vec<UserId>,
	/// Artificial latency added to each enforcement call.
	pub latency: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	moderation: FileModerationSettings,

	#[serde(default)]
	whitelist: FileWhitelistSettings,

	#[serde(default)]
	simulation: FileSimulationSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	metrics_bind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileModerationSettings {
	enforcement_timeout_ms: Option<u64>,
	sweep_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileWhitelistSettings {
	#[serde(default)]
	initial: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileSimulationSettings {
	#[serde(default)]
	admins: Vec<UserId>,
	latency_ms: Option<u64>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		Self {
			server: ServerSettings {
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
			},
			moderation: ModerationSettings {
				enforcement_timeout: Duration::from_millis(
					file.moderation
						.enforcement_timeout_ms
						.filter(|ms| *ms > 0)
						.unwrap_or(DEFAULT_ENFORCEMENT_TIMEOUT_MS),
				),
				sweep_concurrency: file
					.moderation
					.sweep_concurrency
					.filter(|n| *n > 0)
					.unwrap_or(DEFAULT_SWEEP_CONCURRENCY),
			},
			whitelist: WhitelistSettings {
				initial: parse_usernames(file.whitelist.initial.iter().map(String::as_str)),
			},
			simulation: SimulationSettings {
				admins: file.simulation.admins,
				latency: file.simulation.latency_ms.filter(|ms| *ms > 0).map(Duration::from_millis),
			},
		}
	}
}

fn parse_usernames<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<Username> {
	raw.filter_map(|s| match Username::new(s) {
		Ok(u) => Some(u),
		Err(e) => {
			warn!(entry = %s, error = %e, "whitelist config: ignoring invalid entry");
			None
		}
	})
	.collect()
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_overrides(cfg: &mut ServerConfig, var: impl Fn(&str) -> Option<String>) {
	if let Some(v) = var("HUSH_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.metrics_bind = Some(v);
			info!("server config: metrics_bind overridden by env");
		}
	}

	if let Some(v) = var("HUSH_ENFORCEMENT_TIMEOUT_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
		&& ms > 0
	{
		cfg.moderation.enforcement_timeout = Duration::from_millis(ms);
		info!(ms, "moderation config: enforcement_timeout overridden by env");
	}

	if let Some(v) = var("HUSH_SWEEP_CONCURRENCY")
		&& let Ok(n) = v.trim().parse::<usize>()
		&& n > 0
	{
		cfg.moderation.sweep_concurrency = n;
		info!(n, "moderation config: sweep_concurrency overridden by env");
	}

	if let Some(v) = var("HUSH_WHITELIST") {
		cfg.whitelist.initial = parse_usernames(v.split(',').filter(|s| !s.trim().is_empty()));
		info!(entries = cfg.whitelist.initial.len(), "whitelist config: initial overridden by env");
	}

	if let Some(v) = var("HUSH_SIM_ADMINS") {
		cfg.simulation.admins = v
			.split(',')
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.filter_map(|s| match s.parse::<UserId>() {
				Ok(id) => Some(id),
				Err(e) => {
					warn!(entry = %s, error = %e, "simulation config: ignoring invalid admin id");
					None
				}
			})
			.collect();
		info!(admins = cfg.simulation.admins.len(), "simulation config: admins overridden by env");
	}

	if let Some(v) = var("HUSH_SIM_LATENCY_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.simulation.latency = (ms > 0).then(|| Duration::from_millis(ms));
		info!(ms, "simulation config: latency overridden by env");
	}

	if cfg.whitelist.initial.is_empty() {
		warn!("whitelist config: starting with an empty whitelist");
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn parse(toml_src: &str) -> ServerConfig {
		let file: FileConfig = toml::from_str(toml_src).expect("valid toml");
		ServerConfig::from_file(file)
	}

	#[test]
	fn empty_file_uses_defaults() {
		let cfg = parse("");
		assert_eq!(cfg.moderation.enforcement_timeout, Duration::from_secs(10));
		assert_eq!(cfg.moderation.sweep_concurrency, 8);
		assert!(cfg.whitelist.initial.is_empty());
		assert!(cfg.server.metrics_bind.is_none());
	}

	#[test]
	fn reads_all_sections() {
		let cfg = parse(
			r#"
			[server]
			metrics_bind = "127.0.0.1:9100"

			[moderation]
			enforcement_timeout_ms = 2500
			sweep_concurrency = 2

			[whitelist]
			initial = ["user1", "@User2", "bad name"]

			[simulation]
			admins = [1, 2]
			latency_ms = 15
			"#,
		);

		assert_eq!(cfg.server.metrics_bind.as_deref(), Some("127.0.0.1:9100"));
		assert_eq!(cfg.moderation.enforcement_timeout, Duration::from_millis(2500));
		assert_eq!(cfg.moderation.sweep_concurrency, 2);
		let names: Vec<&str> = cfg.whitelist.initial.iter().map(Username::as_str).collect();
		assert_eq!(names, vec!["user1", "User2"]);
		assert_eq!(cfg.simulation.admins, vec![UserId::new(1), UserId::new(2)]);
		assert_eq!(cfg.simulation.latency, Some(Duration::from_millis(15)));
	}

	#[test]
	fn zero_values_fall_back_to_defaults() {
		let cfg = parse("[moderation]\nenforcement_timeout_ms = 0\nsweep_concurrency = 0\n");
		assert_eq!(cfg.moderation.enforcement_timeout, Duration::from_secs(10));
		assert_eq!(cfg.moderation.sweep_concurrency, 8);
	}

	#[test]
	fn env_overrides_win() {
		let mut cfg = parse("[whitelist]\ninitial = [\"a\"]\n");
		let env: HashMap<&str, &str> = HashMap::from([
			("HUSH_WHITELIST", "alice, bob,,"),
			("HUSH_SWEEP_CONCURRENCY", "3"),
			("HUSH_ENFORCEMENT_TIMEOUT_MS", "not-a-number"),
			("HUSH_SIM_ADMINS", "7,x"),
		]);
		apply_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));

		let names: Vec<&str> = cfg.whitelist.initial.iter().map(Username::as_str).collect();
		assert_eq!(names, vec!["alice", "bob"]);
		assert_eq!(cfg.moderation.sweep_concurrency, 3);
		assert_eq!(cfg.moderation.enforcement_timeout, Duration::from_secs(10));
		assert_eq!(cfg.simulation.admins, vec![UserId::new(7)]);
	}

	#[test]
	fn missing_file_is_not_an_error() {
		let path = std::env::temp_dir().join("hush-config-does-not-exist").join("config.toml");
		assert!(read_toml_if_exists(&path).expect("read").is_none());
	}
}
