//! ubxflash-core - FIS merging and flash updates for u-blox GNSS receivers
//!
//! The crate covers both stages of a firmware deployment:
//!
//! - **Merge**: look up the flash chip of a receiver in the XML
//!   [`Catalog`](catalog::Catalog), build its Flash Information Structure
//!   ([`fis`]) and patch it into a firmware image ([`image::merge`]).
//! - **Update**: stream the merged image to the receiver with an
//!   [`UpdateSession`](update::UpdateSession) over any
//!   [`Transport`](transport::Transport).
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use ubxflash_core::catalog::{Catalog, JedecId};
//! use ubxflash_core::image::FirmwareImage;
//!
//! let catalog = Catalog::open(Path::new("flash.xml"))?;
//! let image = FirmwareImage::load_file(Path::new("fw.bin"))?;
//! let merged = image.merge(JedecId::from_u32(0xEF4015), &catalog)?;
//! merged.save(Path::new("fw-merged.bin"))?;
//! # Ok::<(), ubxflash_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod catalog;
pub mod checksum;
pub mod error;
pub mod fis;
pub mod image;
pub mod protocol;
pub mod transport;
pub mod update;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
