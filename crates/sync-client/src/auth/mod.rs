//! Credential acquisition

mod http_token_provider;

pub use http_token_provider::HttpTokenProvider;
