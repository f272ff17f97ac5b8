//! Money normalisation and the receivable settlement state machine.
//!
//! There is exactly one derivation of settlement: the cent-rounded,
//! zero-clamped remaining balance. `paid` means nothing remains,
//! `pending` means nothing was paid, anything in between is `partial`.

use crate::models::{Receivable, ReceivableStatus};
use rust_decimal::{Decimal, RoundingStrategy};

/// Money is carried with two decimal places.
pub const MONEY_SCALE: u32 = 2;

/// Round to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `max(0, total - paid)`, rounded to cents. Sub-cent residue is absorbed here.
pub fn remaining_amount(total_amount: Decimal, paid_amount: Decimal) -> Decimal {
    let remaining = round_money(total_amount - paid_amount);
    if remaining <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        remaining
    }
}

pub fn derive_status(total_amount: Decimal, paid_amount: Decimal) -> ReceivableStatus {
    if round_money(paid_amount) <= Decimal::ZERO {
        ReceivableStatus::Pending
    } else if remaining_amount(total_amount, paid_amount).is_zero() {
        ReceivableStatus::Paid
    } else {
        ReceivableStatus::Partial
    }
}

/// Refresh the derived fields of a receivable in place.
pub fn recompute(receivable: &mut Receivable) {
    receivable.remaining_amount = remaining_amount(receivable.total_amount, receivable.paid_amount);
    receivable.status = derive_status(receivable.total_amount, receivable.paid_amount);
}
