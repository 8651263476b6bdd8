use std::{
	env::var,
	num::{NonZeroU64, NonZeroUsize},
	ops,
	path::Path,
	sync::Arc,
	time::Duration,
};

use axum::extract::FromRequestParts;
use diesel::{
	PgConnection,
	r2d2::{ConnectionManager, Pool},
};
use eyre::WrapErr;
use serde::Deserialize;

use crate::{database::PoolConnection, scheduler::SchedulerConfig};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub server: ServerConfig,
	#[serde(default)]
	pub scraper: ScraperConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
	pub port: u16,
	pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
	/// Number of feeds fetched at the same time.
	pub concurrency: NonZeroUsize,
	pub interval_secs: NonZeroU64,
	pub request_timeout_secs: NonZeroU64,
}

const DEFAULT_CONCURRENCY: NonZeroUsize = NonZeroUsize::new(10).unwrap();
const DEFAULT_INTERVAL_SECS: NonZeroU64 = NonZeroU64::new(60).unwrap();
const DEFAULT_REQUEST_TIMEOUT_SECS: NonZeroU64 = NonZeroU64::new(10).unwrap();

impl Default for ScraperConfig {
	fn default() -> Self {
		Self {
			concurrency: DEFAULT_CONCURRENCY,
			interval_secs: DEFAULT_INTERVAL_SECS,
			request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
		}
	}
}

impl ScraperConfig {
	pub const fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs.get())
	}

	pub const fn scheduler(&self) -> SchedulerConfig {
		SchedulerConfig {
			concurrency: self.concurrency,
			interval: Duration::from_secs(self.interval_secs.get()),
		}
	}
}

impl Config {
	pub fn load_file_from_env() -> eyre::Result<Self> {
		let config_path =
			var("FEEDR_AGGREGATOR_CONFIG").unwrap_or_else(|_| "./config.toml".into());

		let config_path = AsRef::<Path>::as_ref(&config_path)
			.canonicalize()
			.wrap_err("could not find the config file")?;

		let config_content =
			std::fs::read_to_string(config_path).wrap_err("could not read the config file")?;

		Self::from_toml(&config_content)
	}

	pub fn from_toml(content: &str) -> eyre::Result<Self> {
		toml::from_str::<Self>(content).wrap_err("config file does not match the expect structure")
	}
}

#[derive(Debug)]
pub struct Ressources {
	pub database_handle: PoolConnection,
}

#[derive(Debug, Clone)]
pub struct RessourcesRef(Arc<Ressources>);

impl ops::Deref for RessourcesRef {
	type Target = Ressources;
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl FromRequestParts<Self> for RessourcesRef {
	type Rejection = ();
	async fn from_request_parts(
		_parts: &mut axum::http::request::Parts,
		state: &Self,
	) -> Result<Self, Self::Rejection> {
		Ok(state.clone())
	}
}

impl Ressources {
	pub fn init(config: &Config) -> eyre::Result<RessourcesRef> {
		let manager = ConnectionManager::<PgConnection>::new(&config.server.database_url);
		let db_pool = Pool::builder()
			.build(manager)
			.wrap_err("could not build database connection pool")?;

		Ok(Self::from_pool(db_pool))
	}

	pub fn from_pool(database_handle: PoolConnection) -> RessourcesRef {
		RessourcesRef(Arc::new(Self { database_handle }))
	}
}
