//! # Settings Registry
//!
//! Which bank, which controller, which yield source, and which payment unit
//! a deployment uses. Writes are owner-gated. The registry also exposes the
//! deployment's clock, so every component agrees on what time it is.
//!
//! Components do not consult the registry on every call. The deployment
//! reads it once and hands each component the resolved addresses.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use vouch_protocol::clock::{Clock, Timestamp};
use vouch_protocol::identity::Address;
use vouch_protocol::vault::Unit;

use crate::events::{Event, EventLog};
use crate::proxy::{Implementation, Proxy, ProxyError, Upgraded};

/// Storage schema understood by [`SettingsV1`].
pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Errors from the settings registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// Only the registry owner may change bindings.
    #[error("not the owner: {caller}")]
    NotOwner { caller: Address },

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Registry state. Survives logic upgrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsStorage {
    pub schema_version: u32,
    pub owner: Address,
    pub controller: Address,
    pub bank: Address,
    pub yield_source: Address,
    pub payment_unit: Unit,
    pub events: EventLog,
}

impl SettingsStorage {
    pub fn new(owner: Address) -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            owner,
            controller: Address::ZERO,
            bank: Address::ZERO,
            yield_source: Address::ZERO,
            payment_unit: Unit::Native,
            events: EventLog::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logic
// ---------------------------------------------------------------------------

/// Registry logic. Getters have default implementations.
pub trait SettingsLogic: Implementation {
    fn controller(&self, storage: &SettingsStorage) -> Address {
        storage.controller
    }

    fn bank(&self, storage: &SettingsStorage) -> Address {
        storage.bank
    }

    fn yield_source(&self, storage: &SettingsStorage) -> Address {
        storage.yield_source
    }

    fn payment_unit(&self, storage: &SettingsStorage) -> Unit {
        storage.payment_unit
    }

    fn set_controller(
        &self,
        storage: &mut SettingsStorage,
        caller: &Address,
        controller: Address,
    ) -> Result<(), SettingsError>;

    fn set_bank(
        &self,
        storage: &mut SettingsStorage,
        caller: &Address,
        bank: Address,
    ) -> Result<(), SettingsError>;

    fn set_yield_source(
        &self,
        storage: &mut SettingsStorage,
        caller: &Address,
        yield_source: Address,
    ) -> Result<(), SettingsError>;

    fn set_payment_unit(
        &self,
        storage: &mut SettingsStorage,
        caller: &Address,
        unit: Unit,
    ) -> Result<(), SettingsError>;
}

/// First registry logic module.
#[derive(Debug, Clone)]
pub struct SettingsV1 {
    address: Address,
}

impl SettingsV1 {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    fn ensure_owner(storage: &SettingsStorage, caller: &Address) -> Result<(), SettingsError> {
        if *caller != storage.owner {
            warn!(caller = %caller, "rejected settings write from non-owner");
            return Err(SettingsError::NotOwner { caller: *caller });
        }
        Ok(())
    }
}

impl Implementation for SettingsV1 {
    fn address(&self) -> Address {
        self.address
    }

    fn version(&self) -> &str {
        "v1"
    }

    fn schema_version(&self) -> u32 {
        SETTINGS_SCHEMA_VERSION
    }
}

impl SettingsLogic for SettingsV1 {
    fn set_controller(
        &self,
        storage: &mut SettingsStorage,
        caller: &Address,
        controller: Address,
    ) -> Result<(), SettingsError> {
        Self::ensure_owner(storage, caller)?;
        storage.controller = controller;
        info!(controller = %controller, "controller bound");
        Ok(())
    }

    fn set_bank(
        &self,
        storage: &mut SettingsStorage,
        caller: &Address,
        bank: Address,
    ) -> Result<(), SettingsError> {
        Self::ensure_owner(storage, caller)?;
        storage.bank = bank;
        info!(bank = %bank, "bank bound");
        Ok(())
    }

    fn set_yield_source(
        &self,
        storage: &mut SettingsStorage,
        caller: &Address,
        yield_source: Address,
    ) -> Result<(), SettingsError> {
        Self::ensure_owner(storage, caller)?;
        storage.yield_source = yield_source;
        info!(yield_source = %yield_source, "yield source bound");
        Ok(())
    }

    fn set_payment_unit(
        &self,
        storage: &mut SettingsStorage,
        caller: &Address,
        unit: Unit,
    ) -> Result<(), SettingsError> {
        Self::ensure_owner(storage, caller)?;
        storage.payment_unit = unit;
        info!(unit = %unit, "payment unit bound");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Settings component
// ---------------------------------------------------------------------------

/// The registry as deployed: proxy, storage, and clock.
pub struct Settings {
    address: Address,
    proxy: Proxy<dyn SettingsLogic>,
    storage: SettingsStorage,
    clock: Arc<dyn Clock>,
}

impl Settings {
    pub fn new(
        address: Address,
        owner: Address,
        logic: Arc<dyn SettingsLogic>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SettingsError> {
        let storage = SettingsStorage::new(owner);
        if logic.schema_version() != storage.schema_version {
            return Err(ProxyError::IncompatibleStorage {
                live: storage.schema_version,
                candidate: logic.schema_version(),
            }
            .into());
        }
        Ok(Self {
            address,
            proxy: Proxy::new(owner, logic)?,
            storage,
            clock,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn get_time(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn get_controller(&self) -> Address {
        self.proxy.implementation().controller(&self.storage)
    }

    pub fn get_bank(&self) -> Address {
        self.proxy.implementation().bank(&self.storage)
    }

    pub fn get_yield_source(&self) -> Address {
        self.proxy.implementation().yield_source(&self.storage)
    }

    pub fn get_payment_unit(&self) -> Unit {
        self.proxy.implementation().payment_unit(&self.storage)
    }

    pub fn set_controller(&mut self, caller: &Address, controller: Address) -> Result<(), SettingsError> {
        self.proxy
            .implementation()
            .set_controller(&mut self.storage, caller, controller)
    }

    pub fn set_bank(&mut self, caller: &Address, bank: Address) -> Result<(), SettingsError> {
        self.proxy.implementation().set_bank(&mut self.storage, caller, bank)
    }

    pub fn set_yield_source(&mut self, caller: &Address, yield_source: Address) -> Result<(), SettingsError> {
        self.proxy
            .implementation()
            .set_yield_source(&mut self.storage, caller, yield_source)
    }

    pub fn set_payment_unit(&mut self, caller: &Address, unit: Unit) -> Result<(), SettingsError> {
        self.proxy
            .implementation()
            .set_payment_unit(&mut self.storage, caller, unit)
    }

    /// Swap the registry logic; bindings are kept.
    pub fn upgrade(
        &mut self,
        caller: &Address,
        logic: Arc<dyn SettingsLogic>,
    ) -> Result<Upgraded, SettingsError> {
        let upgraded = self.proxy.set_implementation(caller, logic)?;
        self.storage.events.emit(
            self.clock.now(),
            Event::Upgraded {
                implementation: upgraded.implementation,
                version: upgraded.version.clone(),
            },
        );
        Ok(upgraded)
    }

    pub fn freeze_implementation(&mut self, caller: &Address) -> Result<(), SettingsError> {
        Ok(self.proxy.freeze_implementation(caller)?)
    }

    pub fn proxy(&self) -> &Proxy<dyn SettingsLogic> {
        &self.proxy
    }

    pub fn events(&self) -> &EventLog {
        &self.storage.events
    }
}
