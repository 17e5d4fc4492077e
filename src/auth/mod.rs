//! Authentication module
//!
//! Supplies bearer tokens for the source API from an environment variable,
//! a mounted secret file or an inline value. Tokens are fetched once per run
//! through [`CachedTokenProvider`].

mod provider;

pub use provider::{
    provider_from_config, CachedTokenProvider, EnvTokenProvider, FileTokenProvider,
    StaticTokenProvider, TokenProvider,
};
