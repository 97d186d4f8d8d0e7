pub mod handlers;
pub mod scoring;
pub mod search;
