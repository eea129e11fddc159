//! Cache-or-fetch resolution per symbol and the batch cycle around it

pub mod batch;
pub mod orchestrator;

pub use batch::{dedupe_symbols, BatchCounts, BatchEntry, BatchResult, BatchRunner, Provenance};
pub use orchestrator::{SymbolOrchestrator, SymbolOutcome};
