pub mod memory;
pub mod models;
pub mod money;
pub mod repository;
pub mod store;

pub use memory::MemoryLedger;
pub use repository::LedgerRepository;
