//! In-memory collaborators for exercising the scheduler without PostgreSQL
//! or network access.

use std::{
	collections::{HashMap, HashSet},
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use diesel::result::{DatabaseErrorKind, Error as QueryError};
use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{FeedFetcher, FeedStore, InsertOutcome};
use crate::{
	database::{
		StorageError,
		models::{Feed, FeedId, NewPost, UserId},
	},
	fetcher::{self, FetchedItem, parse_document},
};

fn unavailable() -> StorageError {
	StorageError::Query(QueryError::DatabaseError(
		DatabaseErrorKind::ClosedConnection,
		Box::new("storage is unavailable".to_owned()),
	))
}

#[derive(Default)]
struct StoreState {
	feeds: Vec<Feed>,
	posts: Vec<NewPost>,
	/// Every claimed feed, in claim order.
	claims: Vec<FeedId>,
	clock: Option<OffsetDateTime>,
	failing_selection: bool,
	failing_posts: HashSet<String>,
}

/// Feeds and posts kept behind a single lock, which makes every claim
/// trivially atomic. The claim clock advances by a second per call so
/// successive cycles are strictly ordered.
#[derive(Clone, Default)]
pub struct MemoryStore {
	state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_feed(&self, url: &str, last_fetched_at: Option<OffsetDateTime>) -> Feed {
		let feed = Feed {
			id: FeedId::new(),
			name: url.to_owned(),
			url: url.to_owned(),
			user_id: UserId::new(),
			last_fetched_at,
		};
		self.state.lock().feeds.push(feed.clone());
		feed
	}

	pub fn feed(&self, id: FeedId) -> Feed {
		self.state
			.lock()
			.feeds
			.iter()
			.find(|feed| feed.id == id)
			.cloned()
			.unwrap()
	}

	pub fn claims(&self) -> Vec<FeedId> {
		self.state.lock().claims.clone()
	}

	pub fn post_urls(&self) -> Vec<String> {
		self.state
			.lock()
			.posts
			.iter()
			.map(|post| post.url.clone())
			.collect()
	}

	pub fn set_selection_failing(&self, failing: bool) {
		self.state.lock().failing_selection = failing;
	}

	pub fn fail_post(&self, url: &str) {
		self.state.lock().failing_posts.insert(url.to_owned());
	}
}

#[async_trait]
impl FeedStore for MemoryStore {
	async fn select_and_claim_next_feeds(&self, limit: usize) -> Result<Vec<Feed>, StorageError> {
		let mut state = self.state.lock();
		if state.failing_selection {
			return Err(unavailable());
		}

		let now = state.clock.map_or_else(OffsetDateTime::now_utc, |clock| {
			clock + time::Duration::seconds(1)
		});
		state.clock = Some(now);

		let mut due = (0..state.feeds.len()).collect::<Vec<_>>();
		due.sort_by_key(|&index| state.feeds[index].last_fetched_at);
		due.truncate(limit);

		let mut claimed = Vec::with_capacity(due.len());
		for index in due {
			let feed = &mut state.feeds[index];
			feed.last_fetched_at = Some(now);
			claimed.push(feed.clone());
		}
		state.claims.extend(claimed.iter().map(|feed| feed.id));

		Ok(claimed)
	}

	async fn create_post_if_absent(&self, post: NewPost) -> Result<InsertOutcome, StorageError> {
		let mut state = self.state.lock();
		if state.failing_posts.contains(&post.url) {
			return Err(unavailable());
		}
		if state.posts.iter().any(|known| known.url == post.url) {
			return Ok(InsertOutcome::AlreadyExists);
		}

		state.posts.push(post);
		Ok(InsertOutcome::Created)
	}
}

#[derive(Clone)]
enum Scripted {
	Document(String),
	TimeOut,
}

#[derive(Default)]
struct FetcherState {
	responses: Mutex<HashMap<String, Scripted>>,
	latency: Mutex<Duration>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
	calls: AtomicUsize,
}

/// Serves scripted documents, parsed like real ones, and records how many
/// fetches overlap.
#[derive(Clone, Default)]
pub struct MockFetcher {
	state: Arc<FetcherState>,
}

impl MockFetcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn serve(&self, url: &str, document: &str) {
		self.state
			.responses
			.lock()
			.insert(url.to_owned(), Scripted::Document(document.to_owned()));
	}

	pub fn time_out(&self, url: &str) {
		self.state
			.responses
			.lock()
			.insert(url.to_owned(), Scripted::TimeOut);
	}

	pub fn set_latency(&self, latency: Duration) {
		*self.state.latency.lock() = latency;
	}

	pub fn max_in_flight(&self) -> usize {
		self.state.max_in_flight.load(Ordering::SeqCst)
	}

	pub fn calls(&self) -> usize {
		self.state.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl FeedFetcher for MockFetcher {
	async fn fetch_feed(&self, url: &str) -> fetcher::Result<Vec<FetchedItem>> {
		self.state.calls.fetch_add(1, Ordering::SeqCst);
		let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.state.max_in_flight.fetch_max(current, Ordering::SeqCst);

		let latency = *self.state.latency.lock();
		tokio::time::sleep(latency).await;

		let scripted = self.state.responses.lock().get(url).cloned();
		self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

		match scripted {
			Some(Scripted::Document(document)) => Ok(parse_document(document.as_bytes())?),
			Some(Scripted::TimeOut) | None => Err(fetcher::Error::Timeout),
		}
	}
}
