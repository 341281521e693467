//! Default distiller: one task per source item id, in enumeration order.

use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::contract::{SourceProvider, TargetContext, TransformationDistiller};
use crate::error::{Result, TransformationError};
use crate::model::PageTransformationTask;

/// Wraps the source id enumeration into a lazy task stream.
///
/// The stream ends when the enumeration is exhausted or the token is
/// cancelled. Enumeration errors are yielded and the stream moves on.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransformationDistiller;

impl DefaultTransformationDistiller {
    pub fn new() -> Self {
        Self
    }
}

impl TransformationDistiller for DefaultTransformationDistiller {
    fn get_page_transformation_tasks(
        &self,
        source_provider: Arc<dyn SourceProvider>,
        target_context: Arc<dyn TargetContext>,
        token: CancellationToken,
    ) -> BoxStream<'static, Result<PageTransformationTask>> {
        Box::pin(stream! {
            let mut ids = source_provider.get_items_ids(&token);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    next = ids.next() => next,
                };
                match next {
                    Some(Ok(id)) => {
                        debug!(source_item_id = %id, "[DISTILL] Task created");
                        yield Ok(PageTransformationTask::new(
                            source_provider.clone(),
                            id,
                            target_context.clone(),
                        ));
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "[DISTILL] Source enumeration error");
                        yield Err(TransformationError::SourceProvider(e));
                    }
                    None => break,
                }
            }
        })
    }
}
