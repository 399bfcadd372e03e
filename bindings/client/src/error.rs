use std::error::Error;

/// The value of the `error` tag for a failed request.
pub(crate) fn classify(err: &reqwest::Error) -> &'static str {
    // A connect timeout is reported as both, the timeout is the more useful tag.
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_builder() {
        "invalid_request"
    } else if err.is_redirect() {
        "redirect"
    } else if err.is_body() || err.is_decode() {
        "body"
    } else {
        "request"
    }
}

/// Flatten the error and its sources into one line, reqwest keeps the interesting part (refused,
/// reset, dns) in the source chain.
pub(crate) fn describe(err: &reqwest::Error) -> String {
    let mut description = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}
