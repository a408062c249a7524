pub mod catalog;
pub mod store;

pub use catalog::{LayoutCatalog, LayoutDefinition, LightSpec};
pub use store::{PositionMap, PositionStore};
