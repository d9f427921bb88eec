mod line;
mod tallies;

pub use line::{CountDirection, CountingLine, LineConfig, LineError, LineOrientation};
pub use tallies::{FALLBACK, TOTAL, Tallies};
