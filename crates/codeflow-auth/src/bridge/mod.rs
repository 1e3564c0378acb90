//! Host capabilities the client modules consume.
//!
//! The modules never hash, store or send anything themselves. They are
//! handed three bridges at construction:
//!
//! - [`CryptoProvider`] - GUIDs, base64, PKCE pairs
//! - [`KeyValueStorage`] - request-scoped key/value storage
//! - [`NetworkClient`] - GET/POST to the authority
//!
//! Each bridge ships with one canonical implementation. Hosts replace them
//! with their own (browser storage, a keychain, a proxied HTTP stack).

pub mod crypto;
pub mod network;
pub mod storage;

pub use crypto::{CryptoProvider, DefaultCryptoProvider};
pub use network::{NetworkClient, NetworkRequestOptions, NetworkResponse, ReqwestNetworkClient};
pub use storage::{KeyValueStorage, MemoryStorage};
