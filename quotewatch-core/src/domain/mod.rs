//! Domain types: ticker symbols and normalized quotes.

pub mod quote;
pub mod symbol;

pub use quote::QuoteRecord;
pub use symbol::{Symbol, SymbolError};
