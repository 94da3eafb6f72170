//! # Contract onboarding
//!
//! Takes verified contract addresses, parses their source into a type
//! catalog and state variable list, resolves the EVM storage layout, maps ABI
//! events to registry ids, persists the result and hands the accepted
//! contracts to an external backfill program.

pub mod backfill;
pub mod catalog;
pub mod cli;
pub mod constants;
pub mod events;
pub mod layout;
pub mod metadata;
pub mod onboard;
pub mod output;
pub mod source;
pub mod store;
