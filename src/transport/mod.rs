mod http_transport;

pub use http_transport::HttpTransport;

use std::future::Future;

use bytes::Bytes;
use futures_util::Stream;

use crate::error::ChatError;
use crate::protocol::request::ChatRequest;

/// Boxed response body as produced by [`HttpTransport`].
pub type ChatBody = futures_util::stream::BoxStream<'static, Result<Bytes, ChatError>>;

/// Something that can dispatch a chat request and hand back its streaming body.
///
/// The returned body owns the underlying connection: dropping it releases
/// the connection.
pub trait ChatTransport {
    type Body: Stream<Item = Result<Bytes, ChatError>> + Send + Unpin;

    /// Dispatch `request` and return the response body once headers arrive.
    ///
    /// Fails on connection errors, non-success statuses and bodiless responses.
    fn open(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Body, ChatError>> + Send;
}
