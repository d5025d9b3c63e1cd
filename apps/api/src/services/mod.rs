//! Typed clients for the external services the pipelines call. None of
//! them retry or time out on their own: every call is made through the
//! gateway, which owns that policy.

pub mod llm;
pub mod scraper;
