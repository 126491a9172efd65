// ABOUTME: Counters emitted by the mirror run.
// ABOUTME: Recorded through the `metrics` facade; a no-op unless a recorder is installed.

/// A blob upload succeeded
pub fn record_file_uploaded(bytes: u64) {
    metrics::counter!("mirror_files_uploaded_total").increment(1);
    metrics::counter!("mirror_bytes_uploaded_total").increment(bytes);
}

/// A file was dropped from the tree after a non-rate-limit failure
pub fn record_file_skipped() {
    metrics::counter!("mirror_files_skipped_total").increment(1);
}

/// The API answered with a rate limit and the loop paused
pub fn record_rate_limited() {
    metrics::counter!("mirror_rate_limited_total").increment(1);
}
