//! # Deployment
//!
//! Brings up a complete Vouch instance: settings registry, bank, and pledge
//! controller, each behind its own proxy, with the registry bindings
//! written and then read back once to wire the components together.
//!
//! ```text
//!   settings ──(read once)──► bank ◄──── controller
//!                               │
//!                               ▼
//!                        yield source ──► assets
//! ```
//!
//! ```
//! use std::sync::Arc;
//! use vouch_contracts::Deployment;
//! use vouch_protocol::logging::{try_init_logging, LogSettings};
//! use vouch_protocol::{Address, EngineConfig, SystemClock};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! try_init_logging(&LogSettings::default())?;
//! let owner = Address::derive("owner");
//! let (deployment, _assets) =
//!     Deployment::development(owner, EngineConfig::default(), Arc::new(SystemClock))?;
//! assert_eq!(deployment.controller.admin(), owner);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use vouch_protocol::clock::Clock;
use vouch_protocol::config::{ConfigError, EngineConfig};
use vouch_protocol::crypto::signatures::{Ed25519Recovery, SignatureRecovery};
use vouch_protocol::identity::Address;
use vouch_protocol::vault::Unit;

use crate::assets::{InMemoryAssets, ValueTransfer};
use crate::bank::{Bank, BankContext, BankError, BankV1};
use crate::controller::{Controller, ControllerContext, PledgeEngineV1, PledgeError};
use crate::settings::{Settings, SettingsError, SettingsV1};
use crate::yield_source::{DevYieldSource, YieldSource};

pub const SETTINGS_LABEL: &str = "vouch/settings";
pub const BANK_LABEL: &str = "vouch/bank";
pub const CONTROLLER_LABEL: &str = "vouch/controller";
pub const DEV_YIELD_LABEL: &str = "vouch/dev-yield-source";

/// Errors during deployment.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("invalid engine config: {0}")]
    Config(#[from] ConfigError),

    #[error("settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("bank: {0}")]
    Bank(#[from] BankError),

    #[error("controller: {0}")]
    Controller(#[from] PledgeError),
}

/// External collaborators a deployment runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub assets: Arc<dyn ValueTransfer>,
    pub yield_source: Arc<dyn YieldSource>,
    pub clock: Arc<dyn Clock>,
    pub recovery: Arc<dyn SignatureRecovery>,
}

/// A wired Vouch instance.
pub struct Deployment {
    pub owner: Address,
    pub settings: Settings,
    pub bank: Arc<Mutex<Bank>>,
    pub controller: Controller,
}

impl Deployment {
    /// Deploy every component with `owner` as proxy owner, registry owner,
    /// and controller admin.
    pub fn deploy(
        owner: Address,
        config: EngineConfig,
        payment_unit: Unit,
        collaborators: Collaborators,
    ) -> Result<Self, DeploymentError> {
        config.validate()?;

        let mut settings = Settings::new(
            Address::derive(SETTINGS_LABEL),
            owner,
            Arc::new(SettingsV1::new(Address::derive("vouch/settings-v1"))),
            collaborators.clock.clone(),
        )?;
        settings.set_bank(&owner, Address::derive(BANK_LABEL))?;
        settings.set_controller(&owner, Address::derive(CONTROLLER_LABEL))?;
        settings.set_yield_source(&owner, collaborators.yield_source.address())?;
        settings.set_payment_unit(&owner, payment_unit)?;

        let bank_address = settings.get_bank();
        let controller_address = settings.get_controller();

        let bank = Bank::new(
            BankContext {
                address: bank_address,
                controller: controller_address,
                config: config.clone(),
                assets: collaborators.assets.clone(),
                yield_source: collaborators.yield_source.clone(),
                clock: collaborators.clock.clone(),
            },
            owner,
            Arc::new(BankV1::new(Address::derive("vouch/bank-v1"))),
        )?;
        let bank = Arc::new(Mutex::new(bank));

        let controller = Controller::new(
            ControllerContext {
                address: controller_address,
                config,
                bank: bank.clone(),
                clock: collaborators.clock.clone(),
                recovery: collaborators.recovery.clone(),
            },
            owner,
            owner,
            Arc::new(PledgeEngineV1::new(Address::derive("vouch/controller-v1"))),
        )?;

        info!(
            owner = %owner,
            settings = %settings.address(),
            bank = %bank_address,
            controller = %controller_address,
            payment_unit = %payment_unit,
            "deployment complete"
        );

        Ok(Self {
            owner,
            settings,
            bank,
            controller,
        })
    }

    /// Deploy against in-memory assets, the development yield source, and
    /// Ed25519 judge signatures. Returns the assets so callers can mint.
    pub fn development(
        owner: Address,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, Arc<InMemoryAssets>), DeploymentError> {
        let assets = Arc::new(InMemoryAssets::new());
        let yield_source = Arc::new(DevYieldSource::new(
            Address::derive(DEV_YIELD_LABEL),
            assets.clone(),
        ));
        let deployment = Self::deploy(
            owner,
            config,
            Unit::Native,
            Collaborators {
                assets: assets.clone(),
                yield_source,
                clock,
                recovery: Arc::new(Ed25519Recovery),
            },
        )?;
        Ok((deployment, assets))
    }

    pub fn bank_address(&self) -> Address {
        self.settings.get_bank()
    }

    pub fn controller_address(&self) -> Address {
        self.settings.get_controller()
    }

    pub fn payment_unit(&self) -> Unit {
        self.settings.get_payment_unit()
    }
}
