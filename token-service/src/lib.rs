//! Bearer token minting, validation, refresh, and invalidation for a
//! clustered authentication subsystem: key rotation via cluster
//! metadata, an optimistic-concurrency refresh protocol, and a
//! version-aware bearer codec supporting an opaque format and a legacy
//! authenticated-encryption format.

pub mod clock;
pub mod codec;
pub mod config;
mod derivation_executor;
pub mod error;
mod ids;
pub mod invalidation_engine;
pub mod key_manager;
pub mod minting;
pub mod model;
pub mod refresh_engine;
pub mod repository;
mod service;
pub mod validator;

pub use clock::{Clock, FrozenClock, SystemClock};
pub use codec::{ClusterVersion, Codec, Version};
pub use config::TokenServiceConfig;
pub use error::{TokenServiceError, TokenServiceResult};
pub use invalidation_engine::{ExpiredTokenSweeper, InvalidationEngine, NoopSweeper, TokensInvalidationResult};
pub use key_manager::KeyManager;
pub use minting::MintedPair;
pub use model::{Authentication, ClientInfo, UserToken};
pub use refresh_engine::{RefreshEngine, RefreshedPair};
pub use repository::TokenRepository;
pub use service::{MintedTokens, RefreshedTokens, TokenService};
pub use validator::Validator;
