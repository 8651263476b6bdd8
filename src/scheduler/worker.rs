use crate::{
	database::models::{Feed, FeedId, NewPost},
	fetcher::FetchedItem,
	scheduler::{Error, FeedFetcher, FeedStore, InsertOutcome},
};

/// What happened to the items of one feed during a cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedReport {
	pub created: usize,
	pub skipped: usize,
	/// Items without a link or a title.
	pub dropped: usize,
	pub failed: usize,
}

/// Fetches one claimed feed and stores its new posts. Errors are logged and
/// returned for the caller to inspect, they never reach other workers.
pub async fn collect_feed<S, F>(store: &S, fetcher: &F, feed: &Feed) -> Result<FeedReport, Error>
where
	S: FeedStore + ?Sized,
	F: FeedFetcher + ?Sized,
{
	let items = match fetcher.fetch_feed(&feed.url).await {
		Ok(items) => items,
		Err(err) => {
			let err = Error::from(err);
			tracing::warn!(feed_id = %feed.id, url = %feed.url, err = %err, "could not collect feed");
			return Err(err);
		}
	};

	let report = persist_items(store, feed.id, items).await;
	tracing::info!(
		feed_id = %feed.id,
		url = %feed.url,
		created = report.created,
		skipped = report.skipped,
		dropped = report.dropped,
		failed = report.failed,
		"collected feed"
	);

	Ok(report)
}

/// Tries every item on its own, a failing insert does not stop its siblings.
pub async fn persist_items<S>(store: &S, feed_id: FeedId, items: Vec<FetchedItem>) -> FeedReport
where
	S: FeedStore + ?Sized,
{
	let mut report = FeedReport::default();

	for item in items {
		let FetchedItem {
			title: Some(title),
			link: Some(link),
			description,
			published_at,
		} = item
		else {
			report.dropped += 1;
			continue;
		};

		let post = NewPost::new(feed_id, title, link, description, published_at);
		match store.create_post_if_absent(post).await {
			Ok(InsertOutcome::Created) => report.created += 1,
			Ok(InsertOutcome::AlreadyExists) => report.skipped += 1,
			Err(err) => {
				let err = Error::Persistence(err);
				tracing::error!(feed_id = %feed_id, err = %err, "could not store post");
				report.failed += 1;
			}
		}
	}

	report
}
