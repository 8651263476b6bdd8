use std::time::Duration;

use async_trait::async_trait;
use bytes::Buf;
use eyre::WrapErr;
use reqwest::Client;
use url::Url;

use crate::scheduler::FeedFetcher;

mod error;
mod parse;

pub use self::{
	error::{Error, ParseError, Result},
	parse::{FetchedItem, parse_document},
};

/// Retrieves feed documents over HTTP, giving up on a request after a fixed
/// timeout so an unreachable host only ever holds one worker for that long.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
	client: Client,
}

impl HttpFetcher {
	pub fn new(request_timeout: Duration) -> eyre::Result<Self> {
		let user_agent = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
		let client = Client::builder()
			.user_agent(user_agent)
			.timeout(request_timeout)
			.build()
			.wrap_err("could not build client")?;

		Ok(Self { client })
	}
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
	async fn fetch_feed(&self, url: &str) -> Result<Vec<FetchedItem>> {
		let url = Url::parse(url).map_err(|source| Error::InvalidUrl {
			url: url.to_owned(),
			source,
		})?;

		let response = self.client.get(url.clone()).send().await?;

		let status = response.status();
		if !status.is_success() {
			return Err(Error::Status(status));
		}

		let body = response.bytes().await.map_err(|err| {
			if err.is_timeout() {
				Error::Timeout
			} else {
				Error::Body(err)
			}
		})?;

		tracing::debug!(url = %url, len = body.len(), "fetched feed document");

		Ok(parse_document(body.reader())?)
	}
}

#[cfg(test)]
mod tests {
	use std::net::SocketAddr;

	use reqwest::StatusCode;
	use tokio::{
		io::{AsyncReadExt, AsyncWriteExt},
		net::TcpListener,
	};

	use super::*;

	const DOCUMENT: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
	<channel>
		<title>Served</title>
		<link>http://localhost/</link>
		<description>Served feed</description>
		<item>
			<title>First</title>
			<link>http://localhost/first</link>
		</item>
	</channel>
</rss>"#;

	/// Answers every connection with `status` and `body` then closes it.
	async fn serve(status: &'static str, body: &'static str) -> SocketAddr {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		tokio::spawn(async move {
			while let Ok((mut socket, _)) = listener.accept().await {
				let mut buf = [0; 4096];
				let _ = socket.read(&mut buf).await;
				let response = format!(
					"HTTP/1.1 {status}\r\nContent-Type: application/rss+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
					body.len()
				);
				let _ = socket.write_all(response.as_bytes()).await;
				let _ = socket.shutdown().await;
			}
		});

		addr
	}

	/// Accepts connections and never answers them.
	async fn serve_nothing() -> SocketAddr {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		tokio::spawn(async move {
			let mut held = Vec::new();
			while let Ok((socket, _)) = listener.accept().await {
				held.push(socket);
			}
		});

		addr
	}

	#[tokio::test]
	async fn it_fetches_and_parses_a_document() {
		let addr = serve("200 OK", DOCUMENT).await;
		let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

		let items = fetcher.fetch_feed(&format!("http://{addr}/feed")).await.unwrap();

		assert_eq!(items.len(), 1);
		assert_eq!(items[0].link.as_deref(), Some("http://localhost/first"));
	}

	#[tokio::test]
	async fn it_gives_up_after_the_request_timeout() {
		let addr = serve_nothing().await;
		let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();

		let started = tokio::time::Instant::now();
		let result = fetcher.fetch_feed(&format!("http://{addr}/feed")).await;

		assert!(matches!(result, Err(Error::Timeout)), "{result:?}");
		assert!(started.elapsed() < Duration::from_secs(5));
	}

	#[tokio::test]
	async fn it_reports_error_statuses() {
		let addr = serve("404 Not Found", "gone").await;
		let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

		let result = fetcher.fetch_feed(&format!("http://{addr}/feed")).await;

		assert!(
			matches!(result, Err(Error::Status(StatusCode::NOT_FOUND))),
			"{result:?}"
		);
	}

	#[tokio::test]
	async fn it_reports_unparsable_documents() {
		let addr = serve("200 OK", "<html><body>hello</body>").await;
		let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

		let result = fetcher.fetch_feed(&format!("http://{addr}/feed")).await;

		assert!(matches!(result, Err(Error::Parse(_))), "{result:?}");
	}

	#[tokio::test]
	async fn it_rejects_invalid_urls() {
		let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

		let result = fetcher.fetch_feed("not a url").await;

		assert!(matches!(result, Err(Error::InvalidUrl { .. })), "{result:?}");
	}
}
