//! Command implementations for dcs

pub mod list;
pub mod lookup;
pub mod send;

pub use list::list;
pub use lookup::lookup;
pub use send::{send, SendArgs};
