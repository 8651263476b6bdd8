use std::fmt;

use diesel::prelude::*;
use diesel_derive_newtype::DieselNewType;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::database::schema::*;

macro_rules! uuid_id {
	($name:ident) => {
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DieselNewType)]
		pub struct $name(Uuid);

		impl $name {
			pub fn new() -> Self {
				Self(Uuid::new_v4())
			}
		}

		impl Default for $name {
			fn default() -> Self {
				Self::new()
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				self.0.fmt(f)
			}
		}
	};
}

uuid_id!(UserId);
uuid_id!(FeedId);
uuid_id!(PostId);

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = feeds)]
pub struct Feed {
	pub id: FeedId,

	pub name: String,
	pub url: String,
	pub user_id: UserId,

	/// `None` until the scheduler claims the feed for the first time.
	pub last_fetched_at: Option<OffsetDateTime>,
}

/// A post about to be stored, keyed on `url` for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost {
	pub id: PostId,
	pub feed_id: FeedId,

	pub title: String,
	pub url: String,
	pub description: Option<String>,
	pub published_at: Option<OffsetDateTime>,

	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

impl NewPost {
	pub fn new(
		feed_id: FeedId,
		title: String,
		url: String,
		description: Option<String>,
		published_at: Option<OffsetDateTime>,
	) -> Self {
		let now = OffsetDateTime::now_utc();
		Self {
			id: PostId::new(),
			feed_id,
			title,
			url,
			description,
			published_at,
			created_at: now,
			updated_at: now,
		}
	}
}
