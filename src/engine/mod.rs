//! Background maintenance tasks.

mod reaper;

pub use reaper::*;
