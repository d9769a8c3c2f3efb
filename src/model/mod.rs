//! Normalized threat-model records.
//!
//! Both input formats (the diagram exchange document and the JSON security
//! collections) are normalized into these structures before comparison.
//! Reference lists (`component_ids`, `threat_ids`, `data_types`, ...) are
//! stored sorted and de-duplicated so record equality does not depend on the
//! order the source document used.

mod architecture;
mod security;
mod snapshot;

pub use architecture::*;
pub use security::*;
pub use snapshot::*;
