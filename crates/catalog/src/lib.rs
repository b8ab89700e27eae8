//! Part Catalog
//!
//! Read-only index of characterized genetic parts, scoped by host organism
//! and grouped into libraries loaded from catalog or Cello UCF files.

#![warn(missing_docs)]

pub mod registry;
pub mod reference;
pub mod ucf;

pub use registry::{CatalogError, CatalogFile, CatalogSet, PartCatalog};
pub use ucf::{organism_for_library, parse_ucf};
pub use reference::{reference_catalog, reference_parts};
