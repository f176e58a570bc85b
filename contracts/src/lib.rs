//! # Vouch Escrow Components
//!
//! The stateful half of Vouch. A creator locks a pot against a goal, names
//! a panel of judges who pre-authorize their seat by signature, and after
//! the deadline the judges vote. A failing majority forfeits the pot to the
//! panel; otherwise the creator reclaims it once the judgement window
//! closes.
//!
//! - **Proxy**: swappable logic behind a stable component, with an owner
//!   and a one-way freeze.
//! - **Settings**: the registry of component addresses and the clock.
//! - **Bank**: per-user, per-unit custody; fees, escrow, and yield.
//! - **Controller**: the pledge and judgement state machine.
//! - **Deployment**: wires the above together.
//!
//! ## Design Principles
//!
//! 1. All monetary operations are checked. Wrapping arithmetic and money do
//!    not mix.
//! 2. Every operation validates all of its preconditions before the first
//!    mutation. A failed call leaves no trace.
//! 3. State transitions are explicit: enum variants, not boolean flags.
//! 4. Every public record is serializable (serde).

pub mod assets;
pub mod bank;
pub mod controller;
pub mod deployment;
pub mod events;
pub mod proxy;
pub mod settings;
pub mod yield_source;

pub use bank::{Bank, BankError};
pub use controller::{Controller, PledgeError, PledgeRequest, PledgeStatus};
pub use deployment::{Deployment, DeploymentError};
pub use events::{Event, EventLog, EventRecord};
pub use proxy::{Implementation, Proxy, ProxyError, Upgraded};
pub use settings::{Settings, SettingsError};
