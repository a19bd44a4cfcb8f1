//! # codex-acp configuration
//!
//! Layered configuration for the codex-acp adapter. Each source produces a
//! [`ConfigLayer`] of optional values; layers are stacked with
//! [`ConfigLayer::overlay`] and finally resolved into an [`AdapterConfig`].
//!
//! Precedence, lowest to highest:
//!
//! 1. Built-in defaults
//! 2. TOML config file (`$XDG_CONFIG_HOME/codex-acp/config.toml` or `--config`)
//! 3. Environment (`CODEX_*`)
//! 4. Command-line flags
//!
//! ```rust,no_run
//! use codex_acp_config::ConfigLayer;
//!
//! # fn example() -> Result<(), codex_acp_config::ConfigError> {
//! let config = ConfigLayer::default()
//!     .overlay(ConfigLayer::from_env()?)
//!     .resolve();
//! println!("prompts: {:?}", config.prompts_dir);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod adapter;
mod error;
mod layer;

pub use adapter::*;
pub use error::{ConfigError, ConfigResult};
pub use layer::*;
