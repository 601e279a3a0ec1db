//! # limiquantix prlprobe
//!
//! Inspection tool for the Parallels adapter. It loads a domain inventory
//! into the mock SDK, runs the adapter against it and prints the resulting
//! records, which makes it handy for checking translation rules without a
//! Parallels host.

pub mod cli;
pub mod config;
pub mod inventory;
pub mod probe;

pub use config::Config;
pub use inventory::Inventory;
pub use probe::run;
