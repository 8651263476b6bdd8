use std::io::Read;

use feed_rs::{
	model::{Entry, Text},
	parser,
};
use itertools::Itertools;
use time::OffsetDateTime;

use super::ParseError;

/// One entry of a syndication document, candidate for becoming a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedItem {
	pub title: Option<String>,
	pub link: Option<String>,
	pub description: Option<String>,
	/// `None` when the document gives no usable date.
	pub published_at: Option<OffsetDateTime>,
}

/// Decodes an RSS, Atom or JSON feed document into its items.
///
/// Items sharing a link are collapsed onto the first occurrence. Items
/// without a link or title are kept, dropping them is up to the caller.
pub fn parse_document<R: Read>(reader: R) -> Result<Vec<FetchedItem>, ParseError> {
	let parser = parser::Builder::new().sanitize_content(true).build();
	let feed = parser.parse(reader)?;

	let (linked, unlinked): (Vec<_>, Vec<_>) = feed
		.entries
		.into_iter()
		.map(FetchedItem::from)
		.partition(|item| item.link.is_some());

	Ok(linked
		.into_iter()
		.unique_by(|item| item.link.clone())
		.chain(unlinked)
		.collect())
}

impl From<Entry> for FetchedItem {
	fn from(entry: Entry) -> Self {
		let description = entry
			.summary
			.as_ref()
			.and_then(plain_text)
			.or_else(|| {
				entry
					.content
					.and_then(|content| content.body)
					.and_then(|body| to_plain_text(&body))
			});

		Self {
			title: entry.title.as_ref().and_then(plain_text),
			link: entry
				.links
				.into_iter()
				.map(|link| link.href.trim().to_owned())
				.find(|href| !href.is_empty()),
			description,
			published_at: entry
				.published
				.or(entry.updated)
				.and_then(|date| to_offset_date_time(date.timestamp(), date.timestamp_subsec_nanos())),
		}
	}
}

fn plain_text(text: &Text) -> Option<String> {
	to_plain_text(&text.content)
}

/// Strips markup and decodes entities, collapsing whitespace runs. Entities
/// are decoded once more after stripping since publishers often escape twice.
fn to_plain_text(raw: &str) -> Option<String> {
	let stripped = nanohtml2text::html2text(raw);
	let decoded = html_escape::decode_html_entities(&stripped);
	let text = decoded.split_whitespace().join(" ");
	(!text.is_empty()).then_some(text)
}

fn to_offset_date_time(secs: i64, nanos: u32) -> Option<OffsetDateTime> {
	let nanos = i128::from(secs) * 1_000_000_000 + i128::from(nanos);
	OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}
