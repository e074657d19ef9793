pub mod manager;
pub mod memory;
pub mod postgres;
pub mod unit_of_work;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;
pub use unit_of_work::{TransactionDriver, TransactionHandle, TxContext, UnitOfWork};
