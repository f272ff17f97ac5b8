//! Archive policy: which receivables are hidden from the active view.
//!
//! Visibility is computed on every read. Nothing transitions records in the
//! background.

use crate::models::{Receivable, ReceivableStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Active,
    /// Operator set the archive flag, whatever the status.
    ManuallyArchived,
    /// Paid and out of warranty.
    AutoArchived,
}

impl Visibility {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Which slice of a customer's receivables a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Active,
    Archived,
    All,
}

impl View {
    pub fn includes(&self, visibility: Visibility) -> bool {
        match self {
            Self::Active => visibility.is_active(),
            Self::Archived => !visibility.is_active(),
            Self::All => true,
        }
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            "all" => Ok(Self::All),
            other => Err(format!("unknown view '{}'", other)),
        }
    }
}

/// A zero-day warranty counts as already expired.
pub fn warranty_expired(created: DateTime<Utc>, warranty_period_days: i32, now: DateTime<Utc>) -> bool {
    if warranty_period_days <= 0 {
        return true;
    }
    now > created + Duration::days(i64::from(warranty_period_days))
}

pub fn is_archivable(receivable: &Receivable, now: DateTime<Utc>) -> bool {
    receivable.status == ReceivableStatus::Paid
        && warranty_expired(receivable.created_utc, receivable.warranty_period_days, now)
}

pub fn visibility(receivable: &Receivable, now: DateTime<Utc>) -> Visibility {
    if receivable.archived {
        Visibility::ManuallyArchived
    } else if is_archivable(receivable, now) {
        Visibility::AutoArchived
    } else {
        Visibility::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn paid_receivable(created: DateTime<Utc>, warranty_period_days: i32) -> Receivable {
        Receivable {
            receivable_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            product_id: None,
            product_name: "Headphones".to_string(),
            cost_price: None,
            sale_price: None,
            total_amount: Decimal::from(100),
            paid_amount: Decimal::from(100),
            remaining_amount: Decimal::ZERO,
            status: ReceivableStatus::Paid,
            payments: Vec::new(),
            due_date: created.date_naive(),
            warranty_period_days,
            archived: false,
            sold_on_credit: false,
            notes: None,
            created_utc: created,
            updated_utc: created,
            deleted_utc: None,
        }
    }

    fn day_one() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_no_warranty_is_archivable_immediately() {
        let r = paid_receivable(day_one(), 0);
        assert!(is_archivable(&r, day_one()));
        assert_eq!(visibility(&r, day_one()), Visibility::AutoArchived);
    }

    #[test]
    fn test_warranty_keeps_paid_receivable_active_until_expiry() {
        let r = paid_receivable(day_one(), 90);
        assert_eq!(visibility(&r, day_one()), Visibility::Active);
        assert!(!is_archivable(&r, day_one() + Duration::days(90)));
        assert!(is_archivable(&r, day_one() + Duration::days(91)));
    }

    #[test]
    fn test_open_receivable_never_auto_archives() {
        let mut r = paid_receivable(day_one(), 0);
        r.status = ReceivableStatus::Partial;
        assert_eq!(visibility(&r, day_one() + Duration::days(400)), Visibility::Active);
    }

    #[test]
    fn test_manual_flag_wins_for_any_status() {
        let mut r = paid_receivable(day_one(), 90);
        r.status = ReceivableStatus::Pending;
        r.archived = true;
        assert_eq!(visibility(&r, day_one()), Visibility::ManuallyArchived);
        assert!(View::Archived.includes(visibility(&r, day_one())));
        assert!(!View::Active.includes(visibility(&r, day_one())));
    }

    #[test]
    fn test_view_parses_case_insensitively() {
        assert_eq!("Archived".parse::<View>().unwrap(), View::Archived);
        assert!("hidden".parse::<View>().is_err());
    }
}
