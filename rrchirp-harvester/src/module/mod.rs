pub mod cache;
pub mod extractor;
pub mod fetcher;
pub mod http;
pub mod normalizer;
pub mod pipeline;
pub mod rate_limit;
pub mod resolver;
pub mod writer;
