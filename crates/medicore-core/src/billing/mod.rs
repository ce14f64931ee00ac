//! Bill arithmetic and bill export.

mod calculator;
mod export;

pub use calculator::*;
pub use export::*;
