//! Waypoint Component Registry
//!
//! Resolves the renderable unit shown for a node. Units are looked up by the
//! node's page reference or, failing that, by its node type. A miss falls
//! back to [`DEFAULT_FALLBACK`] when one is registered.

mod error;
mod fs_registry;
mod manifest;
mod memory;
mod registry;

pub use error::RegistryError;
pub use fs_registry::FsComponentRegistry;
pub use manifest::{ComponentManifest, RenderableUnit};
pub use memory::InMemoryComponentRegistry;
pub use registry::{ComponentRegistry, DEFAULT_FALLBACK};
