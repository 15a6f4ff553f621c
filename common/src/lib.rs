#![deny(warnings)]

mod data;
mod registry;

pub use data::{types, DataClass, DataLayout};
pub use registry::Registry;
