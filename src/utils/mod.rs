// Utilities around a run: timing statistics and the history log.

pub mod export;
pub mod metrics;
