//! Order source (page fetcher)
//!
//! The source is paginated by a strictly increasing numeric cursor: each call
//! returns the next records whose id is greater than `since_id`. A page shorter
//! than the requested limit is the last one.

pub mod http;

pub use http::HttpOrderSource;

use async_trait::async_trait;
use ordersync_common::RawOrder;

use crate::error::SourceError;

/// One page of upstream orders
#[derive(Debug, Clone, Default)]
pub struct OrderPage {
    /// Decoded orders, ascending by id
    pub orders: Vec<RawOrder>,

    /// Number of elements the source returned, including any that failed to decode
    pub received: usize,

    /// Whether another page may follow (`received == limit`)
    pub has_more: bool,
}

impl OrderPage {
    /// `received` is raised to the number of decoded orders if it is lower
    pub fn new(mut orders: Vec<RawOrder>, received: usize, limit: u32) -> Self {
        orders.sort_by_key(|o| o.id);
        let received = received.max(orders.len());
        Self {
            orders,
            received,
            has_more: received >= limit as usize && received > 0,
        }
    }

    /// Highest source id on the page, the cursor for the next request
    pub fn max_id(&self) -> Option<u64> {
        self.orders.iter().map(|o| o.id).max()
    }

    pub fn is_empty(&self) -> bool {
        self.received == 0
    }
}

/// Paginated source of upstream orders
///
/// Implementations must report transport problems and non-success responses
/// as [`SourceError`]; an `Ok` empty page means the source is exhausted.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn fetch_page(&self, since_id: u64, limit: u32) -> Result<OrderPage, SourceError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders(ids: &[u64]) -> Vec<RawOrder> {
        ids.iter()
            .map(|id| serde_json::from_value(json!({ "id": id })).unwrap())
            .collect()
    }

    #[test]
    fn test_full_page_has_more() {
        let page = OrderPage::new(orders(&[3, 1, 2]), 3, 3);
        assert!(page.has_more);
        assert_eq!(page.max_id(), Some(3));
        assert_eq!(page.orders[0].id, 1);
    }

    #[test]
    fn test_short_page_is_last() {
        let page = OrderPage::new(orders(&[1, 2]), 2, 3);
        assert!(!page.has_more);
    }

    #[test]
    fn test_received_never_below_decoded() {
        let page = OrderPage::new(orders(&[1, 2, 3]), 1, 3);
        assert_eq!(page.received, 3);
        assert!(page.has_more);
        assert!(!page.is_empty());
    }

    #[test]
    fn test_empty_page_is_last() {
        let page = OrderPage::new(vec![], 0, 250);
        assert!(!page.has_more);
        assert!(page.is_empty());
        assert_eq!(page.max_id(), None);
    }
}
