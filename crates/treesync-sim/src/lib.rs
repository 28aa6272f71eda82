//! Treesync Simulator
//!
//! Tooling around a synchronized region that needs no remote catalog or
//! real document:
//! - [`simulator`]: seeded event storm checking the region's invariants
//!   after every event
//! - [`check`]: loads a region config the way a deployment would
//!
//! # Example
//!
//! ```rust,ignore
//! use treesync_sim::simulator::{run_simulator, SimulatorConfig};
//!
//! let report = run_simulator(SimulatorConfig { seed: 7, ..Default::default() }).await?;
//! println!("{}", report.generate_text());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod check;
pub mod simulator;

pub use check::{load_config, render_config};
pub use simulator::{run_simulator, SimulationReport, SimulatorConfig, Violation};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
