//! Domain models for receivables-service.

mod customer;
mod receivable;

pub use customer::{CreditKind, CreditTransaction, Customer, CustomerSummary};
pub use receivable::{
    CreateReceivable, NewPayment, Payment, PaymentMethod, Receivable, ReceivableStatus,
    UpdateReceivable,
};
