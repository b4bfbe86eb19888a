use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

impl TransactionStatus {
    /// Returns whether transitioning from `self` to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Succeeded)
                | (Self::Pending, Self::Failed)
                | (Self::Succeeded, Self::Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Refunded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Inr,
    Usd,
    Eur,
    Gbp,
    Aed,
    Sgd,
}

impl Currency {
    pub const ALLOWED: &[&str] = &["INR", "USD", "EUR", "GBP", "AED", "SGD"];

    pub fn code(self) -> &'static str {
        match self {
            Self::Inr => "INR",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Aed => "AED",
            Self::Sgd => "SGD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported currency {0:?}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INR" => Ok(Self::Inr),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "AED" => Ok(Self::Aed),
            "SGD" => Ok(Self::Sgd),
            other => Err(UnknownCurrency(other.to_string())),
        }
    }
}

/// System-of-record entry for one payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub order_id: String,
    pub user_id: String,
    pub fund_id: String,
    pub periods: BTreeSet<u32>,
    pub amount_minor_units: i64,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub ledger_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn pending(transaction_id: String, charge: &ValidatedCharge, now: DateTime<Utc>) -> Self {
        Self {
            transaction_id,
            order_id: charge.order_id.clone(),
            user_id: charge.user_id.clone(),
            fund_id: charge.fund_id.clone(),
            periods: charge.periods.clone(),
            amount_minor_units: charge.amount_minor_units,
            currency: charge.currency,
            status: TransactionStatus::Pending,
            gateway_reference: None,
            failure_reason: None,
            ledger_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when `charge` describes the same payment this record was created for.
    pub fn matches_charge(&self, charge: &ValidatedCharge) -> bool {
        self.user_id == charge.user_id
            && self.fund_id == charge.fund_id
            && self.periods == charge.periods
            && self.amount_minor_units == charge.amount_minor_units
            && self.currency == charge.currency
    }
}

/// Compare-and-set status change applied by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
}

impl Transition {
    pub fn succeed(gateway_reference: String) -> Self {
        Self {
            from: TransactionStatus::Pending,
            to: TransactionStatus::Succeeded,
            gateway_reference: Some(gateway_reference),
            failure_reason: None,
        }
    }

    pub fn fail(gateway_reference: Option<String>, reason: String) -> Self {
        Self {
            from: TransactionStatus::Pending,
            to: TransactionStatus::Failed,
            gateway_reference,
            failure_reason: Some(reason),
        }
    }

    pub fn refund() -> Self {
        Self {
            from: TransactionStatus::Succeeded,
            to: TransactionStatus::Refunded,
            gateway_reference: None,
            failure_reason: None,
        }
    }
}

/// Result of the conditional insert keyed by order ID.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    Inserted(Transaction),
    Existing(Transaction),
}

/// Charge request as received from the caller. Every field is optional so absence
/// is reported by validation rather than by the JSON decoder.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub payment_token: Option<String>,
    pub amount_minor_units: Option<i64>,
    pub currency: Option<String>,
    pub fund_id: Option<String>,
    pub periods: Option<Vec<i64>>,
    pub user_id: Option<String>,
    pub order_id: Option<String>,
    /// How long this caller is willing to wait for the gateway. Never extends the
    /// configured limit.
    pub timeout_ms: Option<i64>,
}

/// Opaque wallet token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentToken(String);

impl PaymentToken {
    pub fn new(raw: String) -> Self {
        Self(raw)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PaymentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PaymentToken(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedCharge {
    pub order_id: String,
    pub user_id: String,
    pub fund_id: String,
    pub periods: BTreeSet<u32>,
    pub amount_minor_units: i64,
    pub currency: Currency,
    pub payment_token: PaymentToken,
    pub wait: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub transaction_id: Option<String>,
    pub amount: Option<i64>,
    pub reason: Option<String>,
    pub timeout_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRefund {
    pub transaction_id: String,
    pub wait: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub refund_id: String,
    pub original_transaction_id: String,
    pub amount_minor_units: i64,
    pub currency: Currency,
    pub reason: Option<String>,
    pub gateway_reference: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilters {
    pub fund_id: Option<String>,
    pub limit: Option<usize>,
}
