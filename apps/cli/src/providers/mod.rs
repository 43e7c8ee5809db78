//! Concrete provider adapters shipped with the binary.

pub mod flatfile;
pub mod http;

pub use flatfile::FlatFileProvider;
pub use http::HttpProvider;
