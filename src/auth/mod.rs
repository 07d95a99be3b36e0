//! OAuth handshakes, token clients and token lifecycle for Airtable and eBay.

pub mod cookie;
pub mod error;
pub mod manager;
pub mod pkce;
pub mod providers;
pub mod service;
pub mod store;
pub mod token;

pub use cookie::{cookie_name, HandshakeSealer, HANDSHAKE_TTL_SECS};
pub use error::AuthError;
pub use manager::{ConnectionStatus, TokenManager};
pub use pkce::HandshakeState;
pub use providers::{AuthorizationRequest, CodeGrant, TokenClient};
pub use service::{AuthService, AuthorizationRedirect, CallbackParams};
pub use store::{FileTokenStore, TokenStore, TokenStoreConfig};
pub use token::{ProviderId, TokenRecord};
