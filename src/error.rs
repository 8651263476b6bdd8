use axum::{http::StatusCode, response::IntoResponse};
use diesel::r2d2::PoolError;

pub type RouteResult<T> = Result<T, RouteError>;

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
	#[error("pool: {0}")]
	DbPool(#[from] PoolError),

	#[error("query: {0}")]
	Query(#[from] diesel::result::Error),

	#[error("other: {0}")]
	Other(#[from] eyre::Report),
}

impl IntoResponse for RouteError {
	fn into_response(self) -> axum::response::Response {
		tracing::error!(err = %self, "error at route boundary");
		StatusCode::INTERNAL_SERVER_ERROR.into_response()
	}
}
