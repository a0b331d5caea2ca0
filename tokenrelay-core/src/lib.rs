//! # TokenRelay Core
//!
//! Authenticated request orchestration for agents acting on behalf of many
//! end users against an OAuth-protected resource API.
//!
//! This crate provides:
//! - Per-principal credential storage (in-memory and OS keyring backends)
//! - A retrying store reader that tells "absent" apart from "unavailable"
//! - Credential lifecycle management with transparent refresh
//! - Classification of arbitrary failures into actionable [`ErrorKind`]s
//! - A fallback search engine running ordered query relaxations
//! - [`RequestOrchestrator`], the entry point tying these together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokenrelay_core::{
//!     CredentialManager, FallbackSearch, OAuthRefresher, PrincipalId, RequestOrchestrator,
//!     create_store, load_config,
//! };
//!
//! let config = load_config()?;
//! let refresher = OAuthRefresher::new(config.provider.as_ref().unwrap())?;
//! let manager = CredentialManager::new(Arc::new(create_store(true)), refresher, &config)?;
//! let orchestrator = RequestOrchestrator::new(manager, FallbackSearch::new(config.search.clone()));
//!
//! let files = orchestrator
//!     .search(&PrincipalId::new("alice@example.com"), "name contains 'Budget'", 10, &drive)
//!     .await?;
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;
pub mod reader;
pub mod refresh;
pub mod remote;
pub mod search;
pub mod store;

pub use classify::{classify, classify_message};

pub use config::{ConfigError, RelayConfig, init_logging, load_config, load_config_from_path};

pub use error::{ClassifiedError, ErrorKind};

pub use lifecycle::CredentialManager;

pub use model::{Credential, PrincipalId};

pub use orchestrator::RequestOrchestrator;

pub use reader::{ResilientReader, RetryPolicy};

pub use refresh::{RefreshError, RefreshService, RefreshedGrant};

#[cfg(feature = "oauth")]
pub use refresh::{OAuthRefresher, ProviderConfig};

pub use remote::{RemoteError, RemoteItem, RemoteSearch, SearchHit};

pub use search::{FallbackSearch, QueryPlan, QueryStep, SearchConfig, SearchOutcome};

pub use store::{CredentialStore, MemoryStore, Secret, StoreError, create_store};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;
