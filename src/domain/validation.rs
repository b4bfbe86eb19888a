use std::collections::BTreeSet;
use std::time::Duration;

use crate::domain::models::{
    ChargeRequest, Currency, PaymentToken, RefundRequest, ValidatedCharge, ValidatedRefund,
};
use crate::domain::order_id::normalize_order_id;
use crate::error::AppError;

/// ₹1 in paise.
pub const MIN_AMOUNT: i64 = 100;
/// ₹10,00,000 in paise.
pub const MAX_AMOUNT: i64 = 100_000_000;

const MAX_REFERENCE_LENGTH: usize = 128;
const MAX_TOKEN_LENGTH: usize = 16 * 1024;
const MAX_REASON_LENGTH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountLimits {
    pub min: i64,
    pub max: i64,
}

impl Default for AmountLimits {
    fn default() -> Self {
        Self {
            min: MIN_AMOUNT,
            max: MAX_AMOUNT,
        }
    }
}

impl AmountLimits {
    pub fn contains(&self, amount: i64) -> bool {
        (self.min..=self.max).contains(&amount)
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::InvalidRequest(format!("{} is required", field)))
}

fn caller_wait(timeout_ms: Option<i64>) -> Result<Option<Duration>, AppError> {
    timeout_ms
        .map(|ms| match u64::try_from(ms) {
            Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(AppError::InvalidRequest(
                "timeoutMs must be greater than zero".into(),
            )),
        })
        .transpose()
}

fn reference(value: Option<String>, field: &str) -> Result<String, AppError> {
    let value = required(value, field)?;
    let value = value.trim();

    if value.is_empty() {
        return Err(AppError::InvalidRequest(format!(
            "{} must not be empty",
            field
        )));
    }

    if value.len() > MAX_REFERENCE_LENGTH {
        return Err(AppError::InvalidRequest(format!(
            "{} must not exceed {} characters",
            field, MAX_REFERENCE_LENGTH
        )));
    }

    Ok(value.to_string())
}

/// Checks a charge request without touching the network or the store.
pub fn validate_charge(
    req: ChargeRequest,
    limits: &AmountLimits,
) -> Result<ValidatedCharge, AppError> {
    let order_id = normalize_order_id(&required(req.order_id, "orderId")?)?;
    let user_id = reference(req.user_id, "userId")?;
    let fund_id = reference(req.fund_id, "fundId")?;

    let raw_periods = required(req.periods, "periods")?;
    if raw_periods.is_empty() {
        return Err(AppError::InvalidRequest(
            "periods must contain at least one period".into(),
        ));
    }
    let periods = raw_periods
        .into_iter()
        .map(|p| match u32::try_from(p) {
            Ok(p) if p > 0 => Ok(p),
            _ => Err(AppError::InvalidRequest(format!(
                "period {} is not a positive period number",
                p
            ))),
        })
        .collect::<Result<BTreeSet<u32>, AppError>>()?;

    let amount_minor_units = required(req.amount_minor_units, "amountMinorUnits")?;
    if !limits.contains(amount_minor_units) {
        return Err(AppError::InvalidRequest(format!(
            "amountMinorUnits must be between {} and {}",
            limits.min, limits.max
        )));
    }

    let currency = required(req.currency, "currency")?;
    let currency = currency.trim().parse::<Currency>().map_err(|_| {
        AppError::InvalidRequest(format!(
            "currency must be one of {}",
            Currency::ALLOWED.join(", ")
        ))
    })?;

    let payment_token = required(req.payment_token, "paymentToken")?;
    if payment_token.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "paymentToken must not be empty".into(),
        ));
    }
    if payment_token.len() > MAX_TOKEN_LENGTH {
        return Err(AppError::InvalidRequest("paymentToken is too large".into()));
    }

    let wait = caller_wait(req.timeout_ms)?;

    Ok(ValidatedCharge {
        order_id,
        user_id,
        fund_id,
        periods,
        amount_minor_units,
        currency,
        payment_token: PaymentToken::new(payment_token),
        wait,
    })
}

/// Shape checks for a refund; eligibility against the stored record happens in the
/// refund service.
pub fn validate_refund(req: &RefundRequest) -> Result<ValidatedRefund, AppError> {
    let transaction_id = req
        .transaction_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("transactionId is required".into()))?;

    if let Some(amount) = req.amount {
        if amount <= 0 {
            return Err(AppError::InvalidRequest(
                "amount must be greater than zero".into(),
            ));
        }
    }

    if let Some(reason) = &req.reason {
        if reason.len() > MAX_REASON_LENGTH {
            return Err(AppError::InvalidRequest(format!(
                "reason must not exceed {} characters",
                MAX_REASON_LENGTH
            )));
        }
    }

    Ok(ValidatedRefund {
        transaction_id: transaction_id.to_string(),
        wait: caller_wait(req.timeout_ms)?,
    })
}
