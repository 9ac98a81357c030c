//! Core types for the odds aggregation engine
//!
//! This crate defines the shared data structures used across the engine:
//! the vendor game/bookmaker/market/outcome shapes, subscription plans,
//! and the engine-wide error type.

pub mod error;
pub mod game;
pub mod plan;

pub use error::{OddsError, OddsResult};
pub use game::{Bookmaker, Game, Market, Outcome};
pub use plan::{PlanAccess, SubscriptionPlan};
