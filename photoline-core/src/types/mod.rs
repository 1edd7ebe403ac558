//! Domain types shared by the scanner, the catalog ports and the preview
//! pipeline.

pub mod catalog;
pub mod ids;
pub mod metadata;

pub use catalog::*;
pub use ids::*;
pub use metadata::*;
