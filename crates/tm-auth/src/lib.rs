//! Family of Client IDs (FOCI) token tooling for Microsoft Entra ID
//!
//! A refresh token issued to one FOCI member can be redeemed by any other member.
//! This crate exchanges such tokens, decodes the resulting credentials and
//! persists them in the formats downstream tools read.
//!
//! # Flow
//!
//! 1. Seed a [`TokenCache`] with a refresh token, or obtain one through the
//!    [`DeviceCodeFlow`]
//! 2. Exchange it for a token issued to another family member with [`TokenBroker`]
//! 3. Persist the result through an [`OutputSink`], or build an MSAL cache
//!    document with [`msal::build`]
//!
//! # Example
//!
//! ```no_run
//! use tm_auth::{TokenBroker, TokenCache, TokenmanConfig, default_scopes};
//!
//! # async fn example() -> tm_auth::Result<()> {
//! let broker = TokenBroker::new(&TokenmanConfig::default())?;
//! let mut cache = TokenCache::new(None, Some("0.AAAA...".to_string()));
//!
//! let refresh_token = cache.refresh_token().unwrap_or_default().to_string();
//! let token = broker
//!     .exchange_by_family(&refresh_token, "Microsoft Teams", None, &default_scopes())
//!     .await?;
//! cache.apply(&token);
//!
//! println!("Token for: {:?}", cache.username());
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - Tokens are written to disk in plain JSON with owner-only permissions
//! - Tokens are never logged; `TokenCache` and `RunState` redact them in `Debug` output
//! - Exchanges are never retried

pub mod cache;
pub mod claims;
pub mod client;
pub mod config;
pub mod device_code;
pub mod errors;
pub mod file_store;
pub mod foci;
pub mod models;
pub mod msal;
pub mod state;
pub mod store;

// Re-export main types
pub use cache::TokenCache;
pub use claims::{Claims, decode_client_info, decode_jwt};
pub use client::{TokenBroker, default_scopes, is_token_valid_for, union_scopes};
pub use config::{Endpoints, HttpTimeouts, ProxyConfig, TokenmanConfig};
pub use device_code::{DeviceCodeFlow, DeviceCodeSession, DeviceCodeState, PollHandle};
pub use errors::{Result, TokenmanError};
pub use file_store::{DirectorySink, write_json_atomic};
pub use foci::FociRegistry;
pub use models::{DeviceCodeResponse, TokenResponse};
pub use msal::MsalCacheDocument;
pub use state::RunState;
pub use store::{MemorySink, OutputSink, output_name};
