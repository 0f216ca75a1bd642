//! chatvault-core — shared foundation for the ChatVault release tooling.
//!
//! Holds the configuration model (`OpsConfig`, loaded once at startup and
//! passed by reference into every component), the target environment
//! model, the shared poll-with-bounded-retry primitive, the confirmation
//! capability used before destructive operations, and atomic pointer
//! files for crash-resumable state.

pub mod config;
pub mod confirm;
pub mod error;
pub mod pointer;
pub mod poll;

pub use config::{Environment, EnvironmentConfig, OpsConfig, ServiceNames};
pub use confirm::{AlwaysConfirm, Confirm, StdinConfirm};
pub use error::{ConfigError, ConfigResult};
pub use poll::{poll_until, PollOutcome, PollSpec};
