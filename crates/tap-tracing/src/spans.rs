//! Span builder helpers for tap-relay instrumentation.

/// Create a tracing span for an outbound TAP catalog forward.
///
/// Fields recorded after the upstream responds:
/// - `status`: upstream HTTP status code
/// - `latency_ms`: milliseconds from request send to response headers
#[macro_export]
macro_rules! tap_forward_span {
    ($request_id:expr, $target:expr) => {
        tracing::info_span!(
            "tap_forward",
            request_id = %$request_id,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for an outbound prediction-service forward.
///
/// `confidence` is recorded when the upstream payload carries one.
#[macro_export]
macro_rules! predict_forward_span {
    ($request_id:expr, $target:expr) => {
        tracing::info_span!(
            "predict_forward",
            request_id = %$request_id,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            confidence = tracing::field::Empty,
        )
    };
}
