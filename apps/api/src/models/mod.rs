pub mod candidate;
pub mod taxonomy;
pub mod unmatched;
pub mod vocabulary;
