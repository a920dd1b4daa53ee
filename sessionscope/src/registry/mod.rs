//! Session registries.

mod collection;
mod recency;


pub use collection::SessionCollection;
