//! Account and proxy record stores
//!
//! Flat JSON-file collections that the request core consults for credentials
//! and proxy assignment. The request core only reads these records; the
//! harvester binary mutates them (verification results, proxy liveness).
//!
//! Every write goes through an atomic temp-file + rename so a crash mid-write
//! never leaves a truncated file behind.

pub mod accounts;
pub mod error;
mod file;
pub mod model;
pub mod proxies;

pub use accounts::AccountStore;
pub use error::{Error, Result};
pub use model::{Account, AccountStatus, NewAccount, NewProxy, Proxy, ProxyStatus};
pub use proxies::ProxyStore;
