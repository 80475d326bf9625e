//! The change feed contract.
//!
//! A subscription yields row-level [`ChangeEvent`]s for the requested
//! tables. Errors are delivered in-band; after a [`FeedError`] the
//! subscriber should assume it missed events and resynchronize.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use firewatch_core::change::{ChangeEvent, Table};
use futures::stream::{BoxStream, Stream};

use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The subscriber fell behind and `0` events were dropped.
    #[error("Change feed lagged, {0} events dropped")]
    Lagged(u64),

    #[error("Change feed disconnected: {0}")]
    Disconnected(String),
}

#[async_trait]
pub trait ChangeFeed: Send + Sync + 'static {
    async fn subscribe(&self, tables: &[Table]) -> StoreResult<FeedSubscription>;
}

/// A live feed subscription. Dropping it unsubscribes.
pub struct FeedSubscription {
    inner: BoxStream<'static, Result<ChangeEvent, FeedError>>,
}

impl FeedSubscription {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<ChangeEvent, FeedError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for FeedSubscription {
    type Item = Result<ChangeEvent, FeedError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription").finish_non_exhaustive()
    }
}
