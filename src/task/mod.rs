pub mod events;
pub mod manager;
pub mod types;


pub use events::*;
pub use manager::*;
pub use types::*;
