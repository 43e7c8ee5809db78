//! Provider adapters: the boundary between the engine and upstream data
//! sources.

pub mod registry;
pub mod traits;

pub use registry::{EntityRegistry, ProviderRegistry, StaticEntityRegistry};
pub use traits::{FetchCapability, ProviderAdapter, ProviderLimits};
