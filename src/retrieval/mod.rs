//! Keyword retrieval over the local corpus.

pub mod tfidf;

pub use tfidf::{TfidfIndex, TfidfOptions};
