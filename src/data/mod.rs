pub mod connectors;
pub mod synthetic;

pub use connectors::{CsvConnector, TickValidator};
pub use synthetic::synthetic_ticks;
