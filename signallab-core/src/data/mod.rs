//! Price data sources and the screening interface.

pub mod csv_provider;
pub mod provider;
pub mod synthetic;
pub mod universe;

pub use csv_provider::CsvPriceProvider;
pub use provider::{DataError, MemoryProvider, PriceProvider};
pub use synthetic::SyntheticProvider;
pub use universe::{ScreenerFilter, SymbolSelector, Universe};
