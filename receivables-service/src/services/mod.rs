//! Services module for receivables-service.

pub mod allocator;
pub mod archive;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod credit;
pub mod database;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod refund;
pub mod repository;
pub mod saga;
pub mod status;

pub use allocator::{Allocation, AllocationOutcome, OverpaymentPolicy, PaymentAllocator, PaymentSplit};
pub use archive::{View, Visibility};
pub use cache::ReceivableCache;
pub use catalog::{BuyerInfo, CatalogClient, HttpCatalogClient, NoopCatalogClient};
pub use clock::{Clock, FixedClock, SystemClock};
pub use credit::CreditAccount;
pub use database::PgStore;
pub use ledger::{ReceivableView, ReceivablesLedger};
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics, record_error};
pub use refund::{RefundDecision, RefundEngine, RefundOutcome};
pub use repository::{CustomerStore, ReceivableStore, SagaStore};
pub use saga::{SagaAction, SagaKind, SagaRecord, SagaReport, SagaStep, StepStatus};
