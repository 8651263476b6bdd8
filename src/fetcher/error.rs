use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("invalid feed url {url:?}: {source}")]
	InvalidUrl {
		url: String,
		source: url::ParseError,
	},

	#[error("request timed out")]
	Timeout,

	#[error("could not reach server: {0}")]
	Request(#[source] reqwest::Error),

	#[error("server returned an error: {0}")]
	Status(StatusCode),

	#[error("could not access response body: {0}")]
	Body(#[source] reqwest::Error),

	#[error("parse: {0}")]
	Parse(#[from] ParseError),
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			Self::Timeout
		} else {
			Self::Request(err)
		}
	}
}

#[derive(Debug, thiserror::Error)]
#[error("could not parse feed: {0}")]
pub struct ParseError(#[from] feed_rs::parser::ParseFeedError);
