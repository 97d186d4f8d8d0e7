//! Candidates: identity registration, attribute ingestion, the aggregate read
//! model consumed by scoring, and duplicate detection.

pub mod aggregate;
pub mod dedup;
pub mod experience;
pub mod handlers;
pub mod ingest;
pub mod repository;
