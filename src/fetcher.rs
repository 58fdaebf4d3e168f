//! The adapter seam between the engine and a remote resource.

use crate::error::FetchError;
use crate::key::SlotKey;
use crate::slot::{Identified, Page};
use std::future::Future;

/// Parameters for one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub key: SlotKey,
    pub offset: usize,
    pub limit: usize,
}

/// Turns `(key, offset, limit)` into a remote call.
///
/// One implementation per resource family. The adapter owns translating key
/// dimensions into whatever query the resource needs; the engine never
/// interprets them.
pub trait PageFetcher: Send + Sync + 'static {
    type Item: Identified + Clone + Send + Sync + 'static;

    fn fetch_page(
        &self,
        request: PageRequest,
    ) -> impl Future<Output = Result<Page<Self::Item>, FetchError>> + Send;
}
