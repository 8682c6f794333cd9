//! Instrument-control frontend
//!
//! Drives laboratory test equipment (oscilloscopes, multimeters, signal
//! generators, supplies) over GPIB, serial, USB-TMC, LAN, PXI and VXI
//! through one uniform object model. The default backend marshals to a
//! foreign VISA shared library discovered at runtime; alternative
//! transports implement [`backend::Backend`] and register under a
//! `@<name>` selector.
//!
//! ```no_run
//! use instrctl::config::Config;
//! use instrctl::resource::{Messaging, Resource};
//! use instrctl::rm::{OpenOptions, ResourceManager};
//!
//! # fn main() -> instrctl::error::Result<()> {
//! let config = Config {
//!     library_path: "/usr/lib/libvisa.so".to_string(),
//!     ..Config::default()
//! };
//! let rm = ResourceManager::new(&config)?;
//! for name in rm.list_resources(None)? {
//!     println!("{name}");
//! }
//! let resource = rm.open_resource("GPIB0::12::INSTR", OpenOptions::default())?;
//! if let Resource::Gpib(scope) = &resource {
//!     let idn = scope.query("*IDN?")?;
//!     println!("{idn}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod attributes;
pub mod backend;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod resource;
pub mod rm;
pub mod rname;

pub use config::Config;
pub use error::{Error, Result};
pub use resource::{Messaging, RegisterBased, Resource, ResourceOps};
pub use rm::{OpenOptions, ResourceManager};
pub use rname::{ResourceInfo, ResourceName};
