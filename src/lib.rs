//! Listing connector: OAuth token lifecycle for an Airtable base and an eBay
//! seller account.
//!
//! The core is [`auth`]: PKCE handshakes, per-provider token clients and the
//! expiry-aware [`auth::TokenManager`] that refreshes access tokens before
//! they expire. [`server`] exposes the handshake over HTTP and [`airtable`]
//! is a small data client built on the token manager.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use listing_connector::auth::providers::default_clients;
//! use listing_connector::auth::{FileTokenStore, ProviderId, TokenManager, TokenStoreConfig};
//! use listing_connector::config::EnvConfigSource;
//!
//! # async fn example() {
//! let manager = TokenManager::new(
//!     Arc::new(FileTokenStore::new(TokenStoreConfig::new("./data"))),
//!     Arc::new(EnvConfigSource::new()),
//!     default_clients(reqwest::Client::new()),
//! );
//! match manager.valid_access_token(ProviderId::Ebay).await {
//!     Some(_token) => println!("eBay ready"),
//!     None => println!("connect eBay at /oauth/ebay"),
//! }
//! # }
//! ```

pub mod airtable;
pub mod auth;
pub mod config;
pub mod error;
pub mod server;

#[cfg(feature = "cli")]
pub mod cli;
