//! Platform adapters: one generic automation parameterized by per-site profiles.

pub mod adapter;
pub mod automation;
pub mod driver;
pub mod handlers;
pub mod profile;
pub mod registry;
pub mod traits;

#[cfg(test)]
mod tests;

pub use adapter::*;
pub use automation::*;
pub use driver::*;
pub use handlers::*;
pub use profile::*;
pub use registry::*;
pub use traits::*;
