use crate::{database::StorageError, fetcher};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("selection: {0}")]
	Selection(#[source] StorageError),

	#[error("fetch: {0}")]
	Fetch(#[source] fetcher::Error),

	#[error("parse: {0}")]
	Parse(#[source] fetcher::ParseError),

	#[error("persistence: {0}")]
	Persistence(#[source] StorageError),
}

impl From<fetcher::Error> for Error {
	fn from(err: fetcher::Error) -> Self {
		match err {
			fetcher::Error::Parse(err) => Self::Parse(err),
			err => Self::Fetch(err),
		}
	}
}
