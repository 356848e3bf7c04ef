// Bars, aggregation and tick sources.

pub mod aggregate;
pub mod bar_store;
pub mod simulator;
pub mod tick_feed;

pub use aggregate::{aggregate, FIVE_MINUTES, ONE_MINUTE};
pub use bar_store::{normalize_symbol, BarStore, Candle};
