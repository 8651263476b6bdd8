//! Seams between the polling engine and its collaborators, so storage and
//! network access can be swapped out in tests.

use async_trait::async_trait;

use crate::{
	database::{
		StorageError,
		models::{Feed, NewPost},
	},
	fetcher::{self, FetchedItem},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
	Created,
	AlreadyExists,
}

#[async_trait]
pub trait FeedStore: Send + Sync + 'static {
	/// Picks at most `limit` feeds, never-fetched first then stalest first,
	/// and stamps them as fetched in the same atomic step. Two overlapping
	/// calls never return the same feed.
	async fn select_and_claim_next_feeds(&self, limit: usize) -> Result<Vec<Feed>, StorageError>;

	/// Stores the post unless one with the same url already exists.
	async fn create_post_if_absent(&self, post: NewPost) -> Result<InsertOutcome, StorageError>;
}

#[async_trait]
pub trait FeedFetcher: Send + Sync + 'static {
	async fn fetch_feed(&self, url: &str) -> fetcher::Result<Vec<FetchedItem>>;
}
