//! # Vault Module: Units & Balances
//!
//! The accounting vocabulary shared by every component that holds value:
//!
//! ```text
//! unit.rs    : Unit (native or token) and the Amount type
//! balance.rs : BalanceBook: per-(holder, unit) balances with checked math
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are integers in the smallest denomination.** No floating
//!    point, ever. Division only happens in fee and payout splits, and it
//!    always floors.
//! 2. **Every balance is qualified by a unit.** There is no "default" unit
//!    inside the books; callers always say which one they mean.
//! 3. **Serializable state.** Books derive `Serialize`/`Deserialize` so
//!    component storage can be snapshotted.

pub mod balance;
pub mod unit;

pub use balance::{BalanceBook, BalanceError};
pub use unit::{Amount, Unit, GWEI};
