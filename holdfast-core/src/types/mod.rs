pub mod attributes;
pub mod primitives;

pub use attributes::*;
pub use primitives::*;
