pub mod reaper;

pub use reaper::{ExpiryReaper, SweepReport};
