//! Payment reconciliation: applies signed gateway notifications to payments and
//! bookings.
//!
//! Notifications arrive at least once and in no particular order. Processing is
//! therefore idempotent (reapplying a status is a no-op) and monotonic (a
//! notification that ranks below the stored payment status is acknowledged but
//! ignored, see [`precedence`]).

use chrono::NaiveDateTime;
use constant_time_eq::constant_time_eq;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::BookingError;
use crate::ledger::Ledger;
use crate::lifecycle;
use crate::models::{Booking, BookingStatus, Payment, TransactionStatus};
use crate::reservation::{self, CODE_LEN, CODE_PREFIX};
use crate::schema::{bookings, payments};

/// Body of the gateway's HTTP notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub transaction_status: String,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub signature_key: String,
}

/// What a notification asks for once mapped onto our statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    pub payment: TransactionStatus,
    pub booking: Option<BookingStatus>,
}

/// Result of a notification that passed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied {
        payment: TransactionStatus,
        booking: BookingStatus,
    },
    /// The stored state already reflects the notification.
    Unchanged,
    /// The notification ranks below the stored payment status.
    Stale {
        stored: TransactionStatus,
        incoming: TransactionStatus,
    },
}

/// Signature the gateway attaches to a notification: hex SHA-512 over
/// `order_id ‖ status_code ‖ gross_amount ‖ server_key`.
pub fn sign(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_signature(
    notification: &GatewayNotification,
    server_key: &str,
) -> Result<(), BookingError> {
    let expected = sign(
        &notification.order_id,
        &notification.status_code,
        &notification.gross_amount,
        server_key,
    );
    if constant_time_eq(expected.as_bytes(), notification.signature_key.as_bytes()) {
        Ok(())
    } else {
        Err(BookingError::InvalidSignature)
    }
}

/// Order id sent to the gateway for `code`; the suffix keeps retried payment
/// sessions for the same booking distinct.
pub fn order_id_for(code: &str, suffix: i64) -> String {
    format!("{code}-{suffix}")
}

/// Recovers the booking code from `{code}-{suffix}`.
pub fn booking_code_from_order_id(order_id: &str) -> Option<&str> {
    let code = order_id.get(..CODE_LEN)?;
    let rest = order_id.get(CODE_LEN..)?;
    if !code.starts_with(CODE_PREFIX) {
        return None;
    }
    match rest.strip_prefix('-') {
        Some(suffix) if !suffix.is_empty() => Some(code),
        None if rest.is_empty() => Some(code),
        _ => None,
    }
}

pub fn map_status(
    transaction_status: &str,
    fraud_status: Option<&str>,
) -> Result<Effect, BookingError> {
    let effect = |payment, booking| Ok(Effect { payment, booking });
    match (transaction_status, fraud_status) {
        ("capture", Some("challenge")) => effect(TransactionStatus::Challenge, None),
        ("capture", Some("accept")) | ("settlement", _) => effect(
            TransactionStatus::Settlement,
            Some(BookingStatus::Confirmed),
        ),
        ("capture", Some("deny")) | ("deny", _) => effect(TransactionStatus::Deny, None),
        ("pending", _) => effect(TransactionStatus::Pending, None),
        ("expire", _) => effect(TransactionStatus::Expire, Some(BookingStatus::Cancelled)),
        ("cancel", _) => effect(TransactionStatus::Cancel, Some(BookingStatus::Cancelled)),
        (other, fraud) => Err(BookingError::UnrecognizedStatus(match fraud {
            Some(fraud) => format!("{other}/{fraud}"),
            None => other.to_owned(),
        })),
    }
}

/// Ordering used to drop out-of-order deliveries.
///
/// `deny` refuses one gateway transaction only. The booking stays payable, so a
/// later order for it may still settle and must outrank the denial.
pub const fn precedence(status: TransactionStatus) -> u8 {
    match status {
        TransactionStatus::Pending => 0,
        TransactionStatus::Capture | TransactionStatus::Challenge | TransactionStatus::Deny => 1,
        TransactionStatus::Settlement => 2,
        TransactionStatus::Expire | TransactionStatus::Cancel => 3,
    }
}

/// Verifies and applies one gateway notification.
///
/// An error means nothing was written. That covers a bad signature, an unknown
/// booking or status, and a transaction id already held by another payment.
/// Any `Ok` outcome, including
/// [`Outcome::Unchanged`] and [`Outcome::Stale`], should be acknowledged to the
/// gateway as success.
pub async fn handle_notification(
    ledger: &Ledger,
    server_key: &str,
    notification: GatewayNotification,
) -> Result<Outcome, BookingError> {
    tracing::info!(
        order_id = %notification.order_id,
        transaction_status = %notification.transaction_status,
        "payment callback hit"
    );

    if let Err(err) = verify_signature(&notification, server_key) {
        tracing::warn!(order_id = %notification.order_id, "payment callback: invalid signature");
        return Err(err);
    }

    let effect = map_status(
        &notification.transaction_status,
        notification.fraud_status.as_deref(),
    )
    .inspect_err(|err| {
        tracing::warn!(order_id = %notification.order_id, reason = %err, "payment callback rejected");
    })?;

    let Some(code) = booking_code_from_order_id(&notification.order_id).map(str::to_owned) else {
        tracing::warn!(order_id = %notification.order_id, "payment callback: malformed order id");
        return Err(BookingError::BookingNotFound);
    };

    tracing::info!(
        order_id = %notification.order_id,
        transaction_status = %notification.transaction_status,
        payment_type = ?notification.payment_type,
        fraud_status = ?notification.fraud_status,
        "payment callback verified"
    );

    let log_code = code.clone();
    let outcome = ledger
        .transaction(move |conn| apply_locked(conn, &code, effect, &notification, reservation::now()))
        .await
        .inspect_err(|err| {
            match err {
                BookingError::BookingNotFound => {
                    tracing::warn!(booking_code = %log_code, "payment callback: booking not found")
                }
                BookingError::TransactionConflict => tracing::warn!(
                    booking_code = %log_code,
                    "payment callback: transaction id belongs to another payment"
                ),
                _ => {}
            }
        })?;

    match outcome {
        Outcome::Stale { stored, incoming } => tracing::warn!(
            booking_code = %log_code,
            stored = stored.as_str(),
            incoming = incoming.as_str(),
            "payment callback out of order, ignored"
        ),
        _ => tracing::info!(booking_code = %log_code, ?outcome, "payment callback processed"),
    }
    Ok(outcome)
}

fn apply_locked(
    conn: &mut SqliteConnection,
    code: &str,
    effect: Effect,
    notification: &GatewayNotification,
    now: NaiveDateTime,
) -> Result<Outcome, BookingError> {
    let booking = bookings::table
        .filter(bookings::booking_code.eq(code))
        .filter(bookings::deleted_at.is_null())
        .select(Booking::as_select())
        .first(conn)
        .optional()?
        .ok_or(BookingError::BookingNotFound)?;

    let payment = payments::table
        .filter(payments::booking_id.eq(booking.id))
        .select(Payment::as_select())
        .first(conn)
        .optional()?
        .ok_or(BookingError::PaymentMissing)?;

    let stored = payment.transaction_status;
    if precedence(effect.payment) < precedence(stored) {
        return Ok(Outcome::Stale {
            stored,
            incoming: effect.payment,
        });
    }

    let payment_type = notification
        .payment_type
        .clone()
        .unwrap_or(payment.payment_type.clone());
    let transaction_id = notification
        .transaction_id
        .clone()
        .or(payment.transaction_id.clone());
    let fraud_status = notification
        .fraud_status
        .clone()
        .or(payment.fraud_status.clone());

    if let Some(incoming) = transaction_id.as_deref() {
        if payment.transaction_id.as_deref() != Some(incoming) {
            let claimed = diesel::select(exists(
                payments::table
                    .filter(payments::transaction_id.eq(incoming))
                    .filter(payments::id.ne(payment.id)),
            ))
            .get_result::<bool>(conn)?;
            if claimed {
                return Err(BookingError::TransactionConflict);
            }
        }
    }

    let metadata_unchanged = payment_type == payment.payment_type
        && transaction_id == payment.transaction_id
        && fraud_status == payment.fraud_status;
    let transition = effect
        .booking
        .and_then(|target| lifecycle::advance(booking.status, target));

    if stored == effect.payment && metadata_unchanged && transition.is_none() {
        return Ok(Outcome::Unchanged);
    }

    diesel::update(payments::table.find(payment.id))
        .set((
            payments::transaction_status.eq(effect.payment),
            payments::payment_type.eq(&payment_type),
            payments::transaction_id.eq(&transaction_id),
            payments::fraud_status.eq(&fraud_status),
            payments::updated_at.eq(now),
        ))
        .execute(conn)?;

    let booking_status = match transition {
        // Slot release rides on the active-status check above: a booking that is
        // already cancelled has no transition, so the slot is returned once.
        Some(BookingStatus::Cancelled) => {
            reservation::cancel_locked(conn, &booking, effect.payment, now)?;
            BookingStatus::Cancelled
        }
        Some(next) => {
            diesel::update(bookings::table.find(booking.id))
                .set(bookings::status.eq(next))
                .execute(conn)?;
            next
        }
        None => booking.status,
    };

    Ok(Outcome::Applied {
        payment: effect.payment,
        booking: booking_status,
    })
}
