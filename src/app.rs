use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{Json, Router, http::HeaderName, routing::get};
use diesel::RunQueryDsl;
use eyre::WrapErr;
use serde::Serialize;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tower_http::{
	request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
	trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
	config::{Config, RessourcesRef},
	error::RouteResult,
};

pub struct App {
	config: Config,
	ressources: RessourcesRef,
}

impl App {
	pub const fn new(config: Config, ressources: RessourcesRef) -> Self {
		Self { config, ressources }
	}
}

impl App {
	/// Serves until a shutdown signal arrives, then cancels `shutdown` so the
	/// background tasks can wind down too.
	pub async fn serve(self, shutdown: CancellationToken) -> eyre::Result<()> {
		let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.config.server.port);
		let listener = TcpListener::bind(addr)
			.await
			.wrap_err_with(|| format!("could not bind to the specified interface: {addr:?}"))?;

		tracing::info!("starting app router");
		axum::serve(listener, router(self.ressources))
			.with_graceful_shutdown(shutdown_signal(shutdown))
			.await
			.wrap_err("could not serve app")?;

		Ok(())
	}
}

pub fn router(ressources: RessourcesRef) -> Router {
	let x_request_id = HeaderName::from_static("x-request-id");

	Router::new()
		.nest("/v1", Router::new().route("/healthz", get(healthz_handler)))
		.layer(PropagateRequestIdLayer::new(x_request_id.clone()))
		.layer(
			TraceLayer::new_for_http()
				.make_span_with(DefaultMakeSpan::new().include_headers(true))
				.on_response(DefaultOnResponse::new().include_headers(true)),
		)
		.layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
		.with_state(ressources)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
	status: &'static str,
}

// Ready once the database answers
async fn healthz_handler(ressources: RessourcesRef) -> RouteResult<Json<HealthResponse>> {
	let pool = ressources.database_handle.clone();

	tokio::task::spawn_blocking(move || -> RouteResult<()> {
		let mut conn = pool.get()?;
		diesel::sql_query("SELECT 1").execute(&mut conn)?;
		Ok(())
	})
	.await
	.wrap_err("readiness check did not complete")??;

	Ok(Json(HealthResponse { status: "ok" }))
}

async fn shutdown_signal(shutdown: CancellationToken) {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
		() = shutdown.cancelled() => {},
	}

	tracing::info!("shutdown signal received");
	shutdown.cancel();
}
