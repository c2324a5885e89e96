pub mod backoff;
pub mod clock;
pub mod poll;


pub use backoff::*;
pub use clock::*;
pub use poll::*;
