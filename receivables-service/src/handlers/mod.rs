//! HTTP handlers for receivables-service.

pub mod customers;
pub mod health;
pub mod receivables;
pub mod sagas;

pub use customers::*;
pub use health::*;
pub use receivables::*;
pub use sagas::*;
