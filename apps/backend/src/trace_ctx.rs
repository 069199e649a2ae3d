//! Request-scoped trace id.
//!
//! The request trace middleware runs every handler inside [`with_trace_id`];
//! error responses read it back through [`trace_id`] so the `trace_id` in a
//! problem body matches the `x-trace-id` header and the request span.

use std::future::Future;

use tokio::task_local;
use uuid::Uuid;

task_local! {
    static TRACE_ID: String;
}

const UNKNOWN: &str = "unknown";

/// Fresh id for a request that did not bring its own.
pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Trace id of the current request, if running inside one.
pub fn current() -> Option<String> {
    TRACE_ID.try_with(Clone::clone).ok()
}

/// Trace id of the current request, or `"unknown"` outside a request.
pub fn trace_id() -> String {
    current().unwrap_or_else(|| UNKNOWN.to_string())
}

pub async fn with_trace_id<F, R>(trace_id: String, future: F) -> R
where
    F: Future<Output = R>,
{
    TRACE_ID.scope(trace_id, future).await
}
