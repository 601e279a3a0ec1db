//! # limiquantix Parallels
//!
//! Adapter between the Parallels Virtualization SDK and the limiquantix
//! domain registry.
//!
//! The vendor SDK exposes opaque, reference-counted handles and runs every
//! operation as an asynchronous job. This crate wraps that model:
//! - **Handles** are owned by [`Handle`] guards and released on every path
//! - **Jobs** run through [`JobRunner`], which decodes both fault channels
//!   into one [`Fault`]
//! - **Domains** are assembled completely before they enter the
//!   [`DomainRegistry`], and refreshed in place under the record's lock
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            ParallelsDriver              │
//! │  (load_domains, add_domain, refresh)    │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │    Connection     │     │  DomainRegistry   │
//! │ (JobRunner, host) │     │ (locked records)  │
//! └─────────┬─────────┘     └───────────────────┘
//!           ▼
//! ┌───────────────────┐
//! │     dyn Sdk       │
//! │ (vendor or mock)  │
//! └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use limiquantix_parallels::{Connection, ConnectionConfig, MockSdk, ParallelsDriver, SystemHost};
//!
//! let conn = Connection::open(Arc::new(MockSdk::new()), Arc::new(SystemHost), &ConnectionConfig::default())?;
//! let driver = ParallelsDriver::new(conn);
//! driver.load_domains()?;
//! for uuid in driver.domains().uuids() {
//!     let dom = driver.lookup_by_uuid(&uuid)?;
//!     println!("{} {}", dom.name(), dom.lifecycle);
//! }
//! ```

pub mod connection;
pub mod cpumask;
pub mod driver;
pub mod error;
pub mod handle;
pub mod hardware;
pub mod host;
pub mod job;
pub mod mock;
pub mod registry;
pub mod sdk;
pub mod state;
pub mod types;
pub mod uuid_text;

pub use connection::{Connection, ConnectionConfig};
pub use cpumask::CpuMask;
pub use driver::ParallelsDriver;
pub use error::{PrlError, Result};
pub use handle::Handle;
pub use host::{FixedHost, HostInfo, SystemHost};
pub use job::{Fault, FaultInfo, JobRunner};
pub use mock::MockSdk;
pub use registry::{DomainObject, DomainRegistry, LockedDomain, PrivateData};
pub use sdk::{RawHandle, ResultCode, Sdk, SdkResult};
pub use types::*;
