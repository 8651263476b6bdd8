//! The background polling engine.
//!
//! Every tick the scheduler takes the worker slots that are free, claims that
//! many of the most overdue feeds and hands each one to its own worker. A
//! claim stamps the feed as fetched before the fetch happens, so a feed that
//! keeps failing still rotates to the back of the queue instead of being
//! picked again on every tick. The price is that a failed fetch waits a full
//! rotation before it is retried.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use tokio::{
	sync::{OwnedSemaphorePermit, Semaphore},
	time::{MissedTickBehavior, interval},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

mod error;
#[cfg(test)]
mod mocks;
mod traits;
mod worker;

pub use self::{
	error::Error,
	traits::{FeedFetcher, FeedStore, InsertOutcome},
	worker::collect_feed,
};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
	/// Upper bound on fetches in flight, across overlapping cycles too.
	pub concurrency: NonZeroUsize,
	pub interval: Duration,
}

pub struct Scheduler<S, F> {
	store: Arc<S>,
	fetcher: Arc<F>,
	config: SchedulerConfig,

	workers: Arc<Semaphore>,
	tracker: TaskTracker,
}

impl<S: FeedStore, F: FeedFetcher> Scheduler<S, F> {
	pub fn new(store: S, fetcher: F, config: SchedulerConfig) -> Self {
		Self {
			store: Arc::new(store),
			fetcher: Arc::new(fetcher),
			config,
			workers: Arc::new(Semaphore::new(config.concurrency.get())),
			tracker: TaskTracker::new(),
		}
	}

	/// Runs the scheduler on its own task until `cancel` fires.
	pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
		tokio::spawn(self.run(cancel))
	}

	/// Ticks forever, starting a cycle right away and then once per interval.
	/// On cancellation, stops ticking and waits for dispatched workers.
	pub async fn run(self, cancel: CancellationToken) {
		tracing::info!(
			concurrency = self.config.concurrency.get(),
			interval = ?self.config.interval,
			"starting scheduler"
		);

		let mut ticker = interval(self.config.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				() = cancel.cancelled() => break,
				_ = ticker.tick() => {}
			}

			if cancel.is_cancelled() {
				break;
			}

			if let Err(err) = self.run_cycle().await {
				tracing::error!(err = %err, "fetch cycle aborted, retrying next tick");
			}
		}

		tracing::info!(
			in_flight = self.tracker.len(),
			"stopping scheduler, waiting for workers"
		);
		self.tracker.close();
		self.tracker.wait().await;
		tracing::info!("scheduler stopped");
	}

	/// Claims a batch and dispatches one worker per feed without waiting for
	/// them. Returns how many feeds were dispatched.
	pub async fn run_cycle(&self) -> Result<usize, Error> {
		let permits = self.free_workers();
		if permits.is_empty() {
			tracing::debug!("all workers busy, skipping cycle");
			return Ok(0);
		}

		let feeds = self
			.store
			.select_and_claim_next_feeds(permits.len())
			.await
			.map_err(Error::Selection)?;

		tracing::info!(batch = feeds.len(), free = permits.len(), "starting fetch cycle");

		let dispatched = feeds.len();
		for (feed, permit) in feeds.into_iter().zip(permits) {
			let store = Arc::clone(&self.store);
			let fetcher = Arc::clone(&self.fetcher);

			self.tracker.spawn(async move {
				let _permit = permit;
				// errors are logged by the worker and go no further
				let _ = collect_feed(&*store, &*fetcher, &feed).await;
			});
		}

		Ok(dispatched)
	}

	/// Takes every worker slot currently free, without waiting. Slots that
	/// end up without a feed are released when dropped.
	fn free_workers(&self) -> Vec<OwnedSemaphorePermit> {
		std::iter::from_fn(|| Arc::clone(&self.workers).try_acquire_owned().ok()).collect()
	}

	#[cfg(test)]
	async fn wait_for_workers(&self) {
		self.tracker.close();
		self.tracker.wait().await;
		self.tracker.reopen();
	}
}
