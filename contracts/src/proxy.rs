//! # Upgradeable Proxy
//!
//! Every stateful Vouch component is split in two: the *storage* it owns,
//! and a stateless *logic module* that operates on that storage. The
//! [`Proxy`] sits between them and decides which logic module is live.
//!
//! ```text
//!   caller ──► component ──► proxy.implementation() ──► logic(&mut storage)
//! ```
//!
//! Replacing the logic is a single `Arc` swap under `&mut self`, gated by
//! the proxy owner and a one-way freeze flag. Storage never moves, so an
//! upgrade keeps every pledge and balance the component has accumulated.
//!
//! ## Storage compatibility
//!
//! Each logic module reports the storage schema version it was written
//! against. The live module's schema is by construction the storage's
//! schema, so an upgrade is only accepted when the replacement reports the
//! same version. Anything else fails with [`ProxyError::IncompatibleStorage`]
//! instead of reinterpreting storage the new module does not understand.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use vouch_protocol::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from proxy administration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// The caller is not the proxy owner.
    #[error("not the owner: {caller}")]
    Unauthorized { caller: Address },

    /// The implementation is the null module.
    #[error("implementation must be valid")]
    InvalidImplementation,

    /// The implementation is already the live one.
    #[error("already this implementation: {0}")]
    NoOpUpgrade(Address),

    /// The implementation has been frozen.
    #[error("implementation already frozen")]
    Frozen,

    /// The replacement expects a different storage layout.
    #[error("incompatible storage: live schema v{live}, candidate schema v{candidate}")]
    IncompatibleStorage { live: u32, candidate: u32 },
}

// ---------------------------------------------------------------------------
// Implementation
// ---------------------------------------------------------------------------

/// What every logic module reports about itself.
pub trait Implementation: Send + Sync {
    /// Where the module is deployed. `Address::ZERO` is the null module.
    fn address(&self) -> Address;

    /// Human-readable version tag, e.g. `"v1"`.
    fn version(&self) -> &str;

    /// Storage schema this module reads and writes.
    fn schema_version(&self) -> u32;
}

/// Record of a successful upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgraded {
    pub implementation: Address,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

/// Holds the live logic module for one component.
pub struct Proxy<L: ?Sized + Implementation> {
    implementation: Arc<L>,
    owner: Address,
    frozen: bool,
}

impl<L: ?Sized + Implementation> Proxy<L> {
    /// Deploy with an initial implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidImplementation`] if `implementation` is
    /// the null module.
    pub fn new(owner: Address, implementation: Arc<L>) -> Result<Self, ProxyError> {
        if implementation.address().is_zero() {
            return Err(ProxyError::InvalidImplementation);
        }
        Ok(Self {
            implementation,
            owner,
            frozen: false,
        })
    }

    /// Replace the live implementation.
    ///
    /// Checks, in order: caller is owner, candidate is not null, candidate
    /// is not the live module, proxy is not frozen, schemas match.
    pub fn set_implementation(
        &mut self,
        caller: &Address,
        implementation: Arc<L>,
    ) -> Result<Upgraded, ProxyError> {
        if *caller != self.owner {
            warn!(caller = %caller, owner = %self.owner, "rejected upgrade from non-owner");
            return Err(ProxyError::Unauthorized { caller: *caller });
        }

        let candidate = implementation.address();
        if candidate.is_zero() {
            return Err(ProxyError::InvalidImplementation);
        }
        if candidate == self.implementation.address() {
            return Err(ProxyError::NoOpUpgrade(candidate));
        }
        if self.frozen {
            return Err(ProxyError::Frozen);
        }

        let live = self.implementation.schema_version();
        let offered = implementation.schema_version();
        if live != offered {
            return Err(ProxyError::IncompatibleStorage {
                live,
                candidate: offered,
            });
        }

        self.implementation = implementation;
        let version = self.implementation.version().to_string();
        info!(implementation = %candidate, version = %version, "implementation upgraded");

        Ok(Upgraded {
            implementation: candidate,
            version,
        })
    }

    /// Permanently pin the live implementation.
    pub fn freeze_implementation(&mut self, caller: &Address) -> Result<(), ProxyError> {
        if *caller != self.owner {
            warn!(caller = %caller, "rejected freeze from non-owner");
            return Err(ProxyError::Unauthorized { caller: *caller });
        }
        if self.frozen {
            return Err(ProxyError::Frozen);
        }
        self.frozen = true;
        info!(implementation = %self.implementation.address(), "implementation frozen");
        Ok(())
    }

    pub fn is_implementation_frozen(&self) -> bool {
        self.frozen
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// The live logic module.
    pub fn implementation(&self) -> &Arc<L> {
        &self.implementation
    }

    pub fn get_implementation_version(&self) -> &str {
        self.implementation.version()
    }
}

impl<L: ?Sized + Implementation> fmt::Debug for Proxy<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("implementation", &self.implementation.address())
            .field("version", &self.implementation.version())
            .field("owner", &self.owner)
            .field("frozen", &self.frozen)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
