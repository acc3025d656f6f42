//! Page-by-page navigation over a list endpoint.
//!
//! Navigation only moves `skip`; call [`Pager::fetch`] to load the page it
//! points at.

use serde::de::DeserializeOwned;
use serde_json::Value;
use talentdesk_query::QueryDescriptor;

use crate::api::Collection;
use crate::error::ClientError;

pub struct Pager<T = Value> {
    collection: Collection,
    descriptor: QueryDescriptor,
    page_size: u64,
    skip: u64,
    total_items: u64,
    data: Vec<T>,
}

impl<T: DeserializeOwned> Pager<T> {
    pub fn new(
        collection: Collection,
        descriptor: QueryDescriptor,
        page_size: u64,
    ) -> Result<Self, ClientError> {
        if page_size == 0 {
            return Err(ClientError::InvalidPageSize);
        }
        Ok(Self {
            collection,
            descriptor,
            page_size,
            skip: 0,
            total_items: 0,
            data: Vec::new(),
        })
    }

    /// The descriptor sent for the current window. The window overrides any
    /// `skip`/`take` carried by the filter descriptor.
    pub fn request(&self) -> QueryDescriptor {
        QueryDescriptor {
            skip: Some(self.skip),
            take: Some(self.page_size),
            ..self.descriptor.clone()
        }
    }

    /// Load the page at the current window.
    pub async fn fetch(&mut self) -> Result<&[T], ClientError> {
        let page = self.collection.fetch::<T>(&self.request()).await?;
        self.total_items = page.count;
        self.data = page.data;
        Ok(&self.data)
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total_items(&self) -> u64 {
        self.total_items
    }

    /// One-based page the window starts on.
    pub fn current_page(&self) -> u64 {
        self.skip / self.page_size + 1
    }

    pub fn total_pages(&self) -> u64 {
        self.total_items.div_ceil(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.current_page() < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.skip > 0
    }

    /// Returns false, leaving the window alone, on the last page.
    pub fn next_page(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.skip += self.page_size;
        true
    }

    /// Returns false, leaving the window alone, on the first page.
    pub fn prev_page(&mut self) -> bool {
        if !self.has_prev() {
            return false;
        }
        self.skip = self.skip.saturating_sub(self.page_size);
        true
    }

    /// Jump to one-based `page`. Out-of-range pages are ignored.
    pub fn go_to_page(&mut self, page: u64) -> bool {
        if page == 0 || page > self.total_pages() || page == self.current_page() {
            return false;
        }
        self.skip = (page - 1) * self.page_size;
        true
    }

    /// Change the window size and go back to page 1.
    pub fn set_page_size(&mut self, page_size: u64) -> Result<(), ClientError> {
        if page_size == 0 {
            return Err(ClientError::InvalidPageSize);
        }
        self.page_size = page_size;
        self.skip = 0;
        Ok(())
    }

    /// Replace the filter descriptor and go back to page 1.
    pub fn set_descriptor(&mut self, descriptor: QueryDescriptor) {
        self.descriptor = descriptor;
        self.skip = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::testing::StubTransport;
    use std::sync::Arc;
    use talentdesk_query::{FieldFilter, Predicate, Scalar};

    fn pager(rows: usize, page_size: u64) -> Pager {
        let client = ApiClient::new(Arc::new(StubTransport::numbered(rows)));
        Pager::new(client.collection("jobs"), QueryDescriptor::new(), page_size).unwrap()
    }

    #[tokio::test]
    async fn page_math_for_47_rows() {
        let mut pager = pager(47, 10);
        pager.fetch().await.unwrap();

        assert_eq!(pager.total_items(), 47);
        assert_eq!(pager.total_pages(), 5);
        assert_eq!(pager.current_page(), 1);
        assert_eq!(pager.data().len(), 10);

        assert!(pager.go_to_page(5));
        assert_eq!(pager.skip(), 40);
        assert_eq!(pager.current_page(), 5);
        pager.fetch().await.unwrap();
        assert_eq!(pager.data().len(), 7);

        assert!(!pager.next_page());
        assert_eq!(pager.skip(), 40);
    }

    #[tokio::test]
    async fn prev_page_is_a_no_op_on_first_page() {
        let mut pager = pager(47, 10);
        pager.fetch().await.unwrap();
        assert!(!pager.prev_page());
        assert_eq!(pager.skip(), 0);

        assert!(pager.next_page());
        assert!(pager.prev_page());
        assert_eq!(pager.skip(), 0);
    }

    #[tokio::test]
    async fn out_of_range_pages_are_ignored() {
        let mut pager = pager(47, 10);
        pager.fetch().await.unwrap();
        assert!(!pager.go_to_page(0));
        assert!(!pager.go_to_page(6));
        assert_eq!(pager.skip(), 0);
    }

    #[tokio::test]
    async fn changing_page_size_resets_to_first_page() {
        let mut pager = pager(47, 10);
        pager.fetch().await.unwrap();
        pager.go_to_page(3);
        assert_eq!(pager.skip(), 20);

        pager.set_page_size(25).unwrap();
        assert_eq!(pager.skip(), 0);
        assert_eq!(pager.current_page(), 1);
        pager.fetch().await.unwrap();
        assert_eq!(pager.total_pages(), 2);

        assert!(matches!(
            pager.set_page_size(0),
            Err(ClientError::InvalidPageSize)
        ));
    }

    #[tokio::test]
    async fn request_carries_filter_and_window() {
        let client = ApiClient::new(Arc::new(StubTransport::numbered(30)));
        let filter = Predicate::op("n", FieldFilter {
            gte: Some(Scalar::Int(10)),
            ..Default::default()
        });
        let query = QueryDescriptor::new().with_where(filter.clone());
        let mut pager: Pager = Pager::new(client.collection("jobs"), query, 8).unwrap();

        pager.fetch().await.unwrap();
        assert_eq!(pager.total_items(), 20);
        assert_eq!(pager.total_pages(), 3);

        pager.next_page();
        let request = pager.request();
        assert_eq!(request.skip, Some(8));
        assert_eq!(request.take, Some(8));
        assert_eq!(request.filter, Some(filter));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let client = ApiClient::new(Arc::new(StubTransport::numbered(1)));
        let result: Result<Pager, _> =
            Pager::new(client.collection("jobs"), QueryDescriptor::new(), 0);
        assert!(matches!(result, Err(ClientError::InvalidPageSize)));
    }
}
