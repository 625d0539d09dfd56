//! Plant Configuration Module
//!
//! Topology, sensor templates and every pipeline knob, loaded from one TOML
//! document.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `TWINPULSE_CONFIG` environment variable (path to TOML file)
//! 3. `twinpulse.toml` in the current working directory
//! 4. Built-in demo plant (2 sectors × 2 lines × 3 motors)
//!
//! ## Usage
//!
//! Load once at startup and share the result read-only:
//!
//! ```ignore
//! let config = Arc::new(PlantConfig::load(args.config.as_deref())?);
//! let registry = Arc::new(TopologyRegistry::load(&config)?);
//! ```

mod plant_config;
pub mod defaults;
pub mod validation;

pub use plant_config::*;
