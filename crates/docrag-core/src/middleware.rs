//! Request logging wrapper for engine operations.
//!
//! [`logged`] runs an operation inside a span carrying the operation name
//! and a fresh request id, and logs start, finish, elapsed time and failure.
//! The wrapped value is returned unchanged.

use std::future::Future;
use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::DocragResult;

/// How an operation's result reads in the request log.
pub trait LoggedOutcome {
    /// `None` when the operation succeeded, otherwise a short reason.
    fn failure(&self) -> Option<String>;
}

impl<T> LoggedOutcome for DocragResult<T> {
    fn failure(&self) -> Option<String> {
        self.as_ref().err().map(|e| format!("{} ({})", e, e.kind()))
    }
}

impl LoggedOutcome for bool {
    fn failure(&self) -> Option<String> {
        (!*self).then(|| "operation reported failure".to_string())
    }
}

impl LoggedOutcome for String {
    fn failure(&self) -> Option<String> {
        self.is_empty().then(|| "no answer".to_string())
    }
}

/// Run `operation` with request logging.
pub async fn logged<F, T>(operation: &'static str, fut: F) -> T
where
    F: Future<Output = T>,
    T: LoggedOutcome,
{
    let request_id = Uuid::new_v4();
    let span = info_span!("request", operation, %request_id);

    async move {
        let started = Instant::now();
        info!("Request started");

        let result = fut.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result.failure() {
            None => info!(elapsed_ms, "Request finished"),
            Some(reason) => warn!(elapsed_ms, %reason, "Request failed"),
        }
        result
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DocragError;

    #[tokio::test]
    async fn test_value_passes_through() {
        assert!(logged("delete", async { true }).await);
        assert_eq!(logged("answer", async { "yes".to_string() }).await, "yes");

        let err: DocragResult<u32> = logged("ingest", async {
            Err(DocragError::InvalidArgument("bad".to_string()))
        })
        .await;
        assert!(err.is_err());
    }

    #[test]
    fn test_failure_descriptions() {
        assert_eq!(true.failure(), None);
        assert!(false.failure().is_some());
        assert!(String::new().failure().is_some());

        let ok: DocragResult<()> = Ok(());
        assert_eq!(ok.failure(), None);
    }
}
