//! Core types and pure logic for the guild virtual-economy engine.
//!
//! This crate provides the foundational types shared by the storage and
//! ledger crates:
//!
//! - **Identifiers**: [`UserId`], [`TransactionId`], the injected [`IdSource`]
//! - **Accounts**: [`BalanceAccount`], [`ExperienceAccount`], read views
//! - **Journal**: [`CoinTransaction`], [`ExpTransaction`], [`TxStatus`]
//! - **Leveling**: [`LevelTable`] and the pure progression calculator
//! - **Rewards**: amount constants, [`RewardCategory`], daily caps
//! - **Outbox**: [`FollowUp`] work items for detached effects
//!
//! # Units
//!
//! Coin amounts are `i64` in the smallest currency unit; experience is `i64`.
//! Neither is ever represented in floating point.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod error;
pub mod ids;
pub mod level;
pub mod outbox;
pub mod reward;
pub mod transaction;

pub use account::{Audit, BalanceAccount, BalanceView, ExperienceAccount, ExperienceView};
pub use error::{EconomyError, Result};
pub use ids::{IdError, IdSource, TransactionId, UlidSource, UserId};
pub use level::{LevelStanding, LevelTable, LevelTier};
pub use outbox::{FollowUp, FollowUpKind};
pub use reward::RewardCategory;
pub use transaction::{BusinessRef, CoinTransaction, ExpTransaction, TxStatus};
