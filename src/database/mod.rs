use async_trait::async_trait;
use diesel::{
	dsl,
	prelude::*,
	r2d2,
	sql_types::{BigInt, Nullable, Text, Timestamptz},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use eyre::WrapErr;
use time::OffsetDateTime;

use self::models::{Feed, FeedId, NewPost, UserId};
use crate::scheduler::{FeedStore, InsertOutcome};

#[rustfmt::skip]
pub mod schema;
pub mod models;

pub type PoolConnection = r2d2::Pool<r2d2::ConnectionManager<PgConnection>>;
pub type PooledConnection = r2d2::PooledConnection<r2d2::ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[error("pool: {0}")]
	DbPool(#[from] r2d2::PoolError),

	#[error("query: {0}")]
	Query(#[from] diesel::result::Error),

	#[error("blocking task: {0}")]
	Join(#[from] tokio::task::JoinError),
}

pub fn run_migrations(pool: &PoolConnection) -> eyre::Result<()> {
	let mut conn = pool.get().wrap_err("could not obtain a connection handle")?;
	let applied = conn
		.run_pending_migrations(MIGRATIONS)
		.map_err(|err| eyre::eyre!(err))
		.wrap_err("could not run pending migrations")?;

	tracing::info!(count = applied.len(), "applied pending migrations");
	Ok(())
}

/// Row returned by the claim statement, carrying the timestamp the feed had
/// before it was claimed so the batch can be ordered by staleness.
#[derive(Debug, QueryableByName)]
struct ClaimedFeedRow {
	#[diesel(sql_type = diesel::sql_types::Uuid)]
	id: FeedId,
	#[diesel(sql_type = Text)]
	name: String,
	#[diesel(sql_type = Text)]
	url: String,
	#[diesel(sql_type = diesel::sql_types::Uuid)]
	user_id: UserId,
	#[diesel(sql_type = Nullable<Timestamptz>)]
	last_fetched_at: Option<OffsetDateTime>,
	#[diesel(sql_type = Nullable<Timestamptz>)]
	previously_fetched_at: Option<OffsetDateTime>,
}

/// Key of the transaction-scoped advisory lock serializing claims.
const CLAIM_LOCK_KEY: i64 = 0x6665_6564_725f_636c;

// Claims run one at a time under `CLAIM_LOCK_KEY`, so each claim statement
// takes its snapshot after the previous claim committed. Row locks alone do
// not give this: a claim whose snapshot predates another's commit would
// follow the update chain and hand out the same rows again.
const CLAIM_NEXT_FEEDS: &str = r"
WITH due AS (
	SELECT id, last_fetched_at AS previously_fetched_at
	FROM feeds
	ORDER BY last_fetched_at ASC NULLS FIRST, id
	LIMIT $1
	FOR UPDATE
)
UPDATE feeds
SET last_fetched_at = $2, updated_at = $2
FROM due
WHERE feeds.id = due.id
RETURNING feeds.id, feeds.name, feeds.url, feeds.user_id, feeds.last_fetched_at, due.previously_fetched_at
";

impl Feed {
	/// Atomically picks the `limit` stalest feeds and stamps them as fetched.
	/// The returned batch is ordered never-fetched first, then oldest first.
	pub fn claim_next(limit: i64, conn: &mut PooledConnection) -> QueryResult<Vec<Self>> {
		let mut rows = conn.transaction(|conn| {
			diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
				.bind::<BigInt, _>(CLAIM_LOCK_KEY)
				.execute(conn)?;

			diesel::sql_query(CLAIM_NEXT_FEEDS)
				.bind::<BigInt, _>(limit)
				.bind::<Timestamptz, _>(OffsetDateTime::now_utc())
				.load::<ClaimedFeedRow>(conn)
		})?;

		// `None` sorts before `Some`, which is exactly never-fetched first.
		rows.sort_by_key(|row| (row.previously_fetched_at, row.id));

		Ok(rows
			.into_iter()
			.map(|row| Self {
				id: row.id,
				name: row.name,
				url: row.url,
				user_id: row.user_id,
				last_fetched_at: row.last_fetched_at,
			})
			.collect())
	}
}

impl NewPost {
	pub fn insert_if_absent(&self, conn: &mut PooledConnection) -> QueryResult<InsertOutcome> {
		use crate::database::schema::*;

		let inserted = dsl::insert_into(posts::table)
			.values(self)
			.on_conflict(posts::url)
			.do_nothing()
			.execute(conn)?;

		Ok(if inserted == 0 {
			InsertOutcome::AlreadyExists
		} else {
			InsertOutcome::Created
		})
	}
}

/// [`FeedStore`] backed by the PostgreSQL pool. Diesel is blocking so every
/// call hops onto the blocking thread pool.
#[derive(Debug, Clone)]
pub struct PgStore {
	pool: PoolConnection,
}

impl PgStore {
	pub const fn new(pool: PoolConnection) -> Self {
		Self { pool }
	}

	async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
	where
		T: Send + 'static,
		F: FnOnce(&mut PooledConnection) -> QueryResult<T> + Send + 'static,
	{
		let pool = self.pool.clone();
		tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
			let mut conn = pool.get()?;
			Ok(f(&mut conn)?)
		})
		.await?
	}
}

#[async_trait]
impl FeedStore for PgStore {
	async fn select_and_claim_next_feeds(&self, limit: usize) -> Result<Vec<Feed>, StorageError> {
		let limit = i64::try_from(limit).unwrap_or(i64::MAX);
		self.with_conn(move |conn| Feed::claim_next(limit, conn)).await
	}

	async fn create_post_if_absent(&self, post: NewPost) -> Result<InsertOutcome, StorageError> {
		self.with_conn(move |conn| post.insert_if_absent(conn)).await
	}
}
