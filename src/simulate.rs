use chrono::Utc;
use diesel::prelude::*;

use crate::error::BookingError;
use crate::ledger::Ledger;
use crate::models::{BookingStatus, TransactionStatus};
use crate::reconciliation::{self, order_id_for, GatewayNotification, Outcome};
use crate::schema::{bookings, payments};

/// Builds a correctly signed notification for `code`.
pub fn signed_notification(
    code: &str,
    gross_amount: i64,
    transaction_status: &str,
    server_key: &str,
    suffix: i64,
) -> GatewayNotification {
    let order_id = order_id_for(code, suffix);
    let status_code = "200".to_owned();
    let gross_amount = format!("{gross_amount}.00");
    let signature_key = reconciliation::sign(&order_id, &status_code, &gross_amount, server_key);
    let transaction_id = format!("sim-{order_id}");
    GatewayNotification {
        order_id,
        status_code,
        gross_amount,
        transaction_status: transaction_status.to_owned(),
        payment_type: Some("qris".to_owned()),
        fraud_status: Some("accept".to_owned()),
        transaction_id: Some(transaction_id),
        signature_key,
    }
}

/// Sends a simulated notification for `code`, or for the most recent booking
/// whose payment is still pending. Returns the booking code used and the outcome.
pub async fn simulate_callback(
    ledger: &Ledger,
    server_key: &str,
    code: Option<String>,
    transaction_status: &str,
) -> Result<(String, Outcome), BookingError> {
    let (code, amount) = ledger
        .read(move |conn| {
            let query = bookings::table
                .inner_join(payments::table)
                .filter(bookings::deleted_at.is_null())
                .select((bookings::booking_code, bookings::total_price))
                .into_boxed();
            let query = match code {
                Some(code) => query.filter(bookings::booking_code.eq(code)),
                None => query
                    .filter(bookings::status.eq(BookingStatus::Pending))
                    .filter(payments::transaction_status.eq(TransactionStatus::Pending))
                    .order(bookings::id.desc()),
            };
            query
                .first::<(String, i64)>(conn)
                .optional()?
                .ok_or(BookingError::BookingNotFound)
        })
        .await?;

    let notification = signed_notification(
        &code,
        amount,
        transaction_status,
        server_key,
        Utc::now().timestamp(),
    );
    let outcome = reconciliation::handle_notification(ledger, server_key, notification).await?;
    Ok((code, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_notification_passes_verification() {
        let notification = signed_notification("BA-AB12CD34", 250_000, "settlement", "key", 17);
        assert_eq!(notification.order_id, "BA-AB12CD34-17");
        assert_eq!(notification.gross_amount, "250000.00");
        assert_eq!(notification.transaction_id.as_deref(), Some("sim-BA-AB12CD34-17"));
        assert!(reconciliation::verify_signature(&notification, "key").is_ok());
    }
}
