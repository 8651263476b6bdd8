use eyre::WrapErr;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::app::App;
use crate::config::{Config, Ressources};
use crate::database::PgStore;
use crate::fetcher::HttpFetcher;
use crate::scheduler::Scheduler;

mod app;
mod config;
mod database;
mod error;
mod fetcher;
mod scheduler;

#[tokio::main]
async fn main() -> eyre::Result<()> {
	let config = Config::load_file_from_env().wrap_err("could not load the config")?;
	setup_tracing();

	let ressources = Ressources::init(&config).wrap_err("could not init ressources")?;
	database::run_migrations(&ressources.database_handle)
		.wrap_err("could not prepare the database")?;

	let shutdown = CancellationToken::new();

	let fetcher = HttpFetcher::new(config.scraper.request_timeout())
		.wrap_err("could not setup the feed fetcher")?;
	let scheduler = Scheduler::new(
		PgStore::new(ressources.database_handle.clone()),
		fetcher,
		config.scraper.scheduler(),
	)
	.spawn(shutdown.clone());

	let served = App::new(config, ressources).serve(shutdown.clone()).await;

	// the scheduler must stop even if the server failed early
	shutdown.cancel();
	scheduler.await.wrap_err("scheduler task panicked")?;

	served
}

fn setup_tracing() {
	Registry::default()
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info,feedr_aggregator=debug".into()),
		)
		.with(
			tracing_subscriber::fmt::layer()
				.with_file(true)
				.with_line_number(true),
		)
		.init();
}
