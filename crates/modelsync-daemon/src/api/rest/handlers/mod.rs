//! API request handlers

mod events;
mod health;
mod sync;

pub use events::*;
pub use health::*;
pub use sync::*;
