// 駆動される側アダプター（リポジトリ実装など）

mod in_memory_store;
mod inventory_repository;
mod hold_ledger;
mod logging_notifier;
mod tracing_logger;

pub use in_memory_store::InMemoryReservationStore;
pub use inventory_repository::MySqlInventoryRepository;
pub use hold_ledger::MySqlHoldLedger;
pub use logging_notifier::LoggingNotifier;
pub use tracing_logger::TracingLogger;
