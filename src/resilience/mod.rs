//! Retry with exponential backoff for publish, subscribe, and connection setup.

pub mod retry;
