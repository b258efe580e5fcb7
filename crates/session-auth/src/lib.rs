//! Session credentials for the authenticated request pipeline
//!
//! Holds the process-wide access/refresh token pair and knows how to talk to
//! the token endpoints. Persistence goes through an injected `KeyValueStore`
//! so the same store works over a JSON file in the CLI and over memory in
//! tests.
//!
//! Credential lifecycle:
//! 1. Startup calls `CredentialStore::load()` with the persisted backend
//! 2. Login stores both tokens via `CredentialStore::set()`
//! 3. A successful refresh renews the access token via `CredentialStore::set_access()`
//! 4. Logout or a terminal auth failure calls `CredentialStore::clear()`

pub mod backend;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use backend::{FileStore, KeyValueStore, MemoryStore, StoreChange};
pub use constants::*;
pub use credentials::{CredentialStore, Credentials};
pub use error::{Error, Result};
pub use token::{TokenPair, parse_access_token, parse_token_pair, refresh_request};
