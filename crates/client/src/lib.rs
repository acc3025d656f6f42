//! Talentdesk list client.
//!
//! Sends query descriptors to the list endpoints and turns the paginated
//! responses into either page-by-page navigation ([`Pager`]) or a growing
//! "load more" list ([`Feed`]). Identical requests are served from a
//! process-wide [`QueryCache`] that mutations invalidate per entity.

pub mod api;
pub mod cache;
pub mod error;
pub mod feed;
pub mod pager;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, Collection};
pub use cache::QueryCache;
pub use error::ClientError;
pub use feed::{AccumulatedPageState, Feed, FeedConfig, FeedMode, LoadDirection, LoadOutcome};
pub use pager::Pager;
pub use transport::{HttpTransport, Transport};
