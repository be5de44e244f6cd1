//! Outbound payment gateway (Midtrans Snap) and session-token issuance.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::auth::Actor;
use crate::config::GatewayConfig;
use crate::error::BookingError;
use crate::ledger::Ledger;
use crate::lifecycle;
use crate::models::{Booking, Payment, Service, User};
use crate::reconciliation::order_id_for;
use crate::reservation;
use crate::schema::{bookings, payments, schedules, services, users};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapRequest {
    pub transaction_details: TransactionDetails,
    pub customer_details: CustomerDetails,
    pub item_details: Vec<ItemDetails>,
    pub enabled_payments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDetails {
    pub id: String,
    pub price: i64,
    pub quantity: u32,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<GatewayError> for BookingError {
    fn from(err: GatewayError) -> Self {
        Self::Gateway(err.to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment session and returns its one-time token.
    async fn create_session_token(&self, request: &SnapRequest) -> Result<String, GatewayError>;
}

pub struct MidtransGateway {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

#[derive(Deserialize)]
struct SnapResponse {
    token: String,
}

impl MidtransGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/snap/v1/transactions", config.base_url()),
            server_key: config.server_key.clone(),
        })
    }

    pub fn shared(config: &GatewayConfig) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        Ok(Arc::new(Self::new(config)?))
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    async fn create_session_token(&self, request: &SnapRequest) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.server_key, Some(""))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<SnapResponse>().await?.token)
    }
}

/// Token handed to the client to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionToken {
    pub snap_token: String,
    pub client_key: String,
}

struct Checkout {
    booking: Booking,
    payment: Payment,
    user: User,
    service: Service,
}

/// Requests a payment session for `booking_id` and stores its token on the payment.
///
/// The gateway call happens outside any ledger transaction; a failure leaves the
/// payment untouched.
///
/// # Errors
///
/// `BookingNotFound`, `Forbidden` when `actor` is not the owner,
/// `AlreadyConfirmed`/`AlreadyCancelled` when the booking is no longer payable,
/// `PaymentMissing`, or `Gateway` when the round-trip fails.
pub async fn issue_session_token(
    ledger: &Ledger,
    gateway: &dyn PaymentGateway,
    config: &GatewayConfig,
    booking_id: i32,
    actor: Actor,
) -> Result<SessionToken, BookingError> {
    let checkout = ledger
        .read(move |conn| {
            let booking = bookings::table
                .find(booking_id)
                .filter(bookings::deleted_at.is_null())
                .select(Booking::as_select())
                .first(conn)
                .optional()?
                .ok_or(BookingError::BookingNotFound)?;

            if booking.user_id != actor.user_id {
                return Err(BookingError::Forbidden);
            }
            lifecycle::ensure_payable(booking.status)?;

            let payment = payments::table
                .filter(payments::booking_id.eq(booking.id))
                .select(Payment::as_select())
                .first(conn)
                .optional()?
                .ok_or(BookingError::PaymentMissing)?;

            let user = users::table
                .find(booking.user_id)
                .select(User::as_select())
                .first(conn)?;

            let service = schedules::table
                .inner_join(services::table)
                .filter(schedules::id.eq(booking.schedule_id))
                .select(Service::as_select())
                .first(conn)?;

            Ok(Checkout {
                booking,
                payment,
                user,
                service,
            })
        })
        .await?;

    let request = snap_request(&checkout, &config.enabled_payments, Utc::now().timestamp());
    tracing::info!(
        booking_id,
        order_id = %request.transaction_details.order_id,
        "requesting payment session"
    );

    let started = Instant::now();
    let token = gateway
        .create_session_token(&request)
        .await
        .inspect_err(|err| {
            tracing::error!(booking_id, error = %err, "payment gateway call failed");
        })?;
    tracing::info!(
        booking_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "payment session token received"
    );

    let payment_id = checkout.payment.id;
    let stored = token.clone();
    ledger
        .transaction(move |conn| {
            diesel::update(payments::table.find(payment_id))
                .set((
                    payments::snap_token.eq(Some(stored)),
                    payments::updated_at.eq(reservation::now()),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await?;

    Ok(SessionToken {
        snap_token: token,
        client_key: config.client_key.clone(),
    })
}

fn snap_request(checkout: &Checkout, enabled_payments: &[String], suffix: i64) -> SnapRequest {
    let price = checkout.booking.total_price;
    SnapRequest {
        transaction_details: TransactionDetails {
            order_id: order_id_for(&checkout.booking.booking_code, suffix),
            gross_amount: price,
        },
        customer_details: CustomerDetails {
            first_name: checkout.user.name.clone(),
            email: checkout.user.email.clone(),
            phone: checkout.user.phone_number.clone(),
        },
        item_details: vec![ItemDetails {
            id: checkout.service.id.to_string(),
            price,
            quantity: 1,
            name: format!("Makeup Class: {}", checkout.service.name),
        }],
        enabled_payments: enabled_payments.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, TransactionStatus};
    use chrono::NaiveDate;

    fn checkout() -> Checkout {
        let at = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Checkout {
            booking: Booking {
                id: 3,
                user_id: 7,
                schedule_id: 1,
                booking_code: "BA-AB12CD34".to_owned(),
                status: BookingStatus::Pending,
                total_price: 250_000,
                booking_date: at,
                deleted_at: None,
            },
            payment: Payment {
                id: 3,
                booking_id: 3,
                transaction_id: None,
                payment_type: "tbd".to_owned(),
                gross_amount: 250_000,
                transaction_status: TransactionStatus::Pending,
                fraud_status: None,
                snap_token: None,
                updated_at: at,
            },
            user: User {
                id: 7,
                name: "Sari".to_owned(),
                email: "sari@example.com".to_owned(),
                phone_number: None,
                role: "user".to_owned(),
            },
            service: Service {
                id: 2,
                name: "Bridal Makeup".to_owned(),
                price: 300_000,
                deleted_at: None,
            },
        }
    }

    #[test]
    fn request_uses_booking_snapshot_not_current_service_price() {
        let request = snap_request(&checkout(), &["gopay".to_owned()], 1_708_012_345);
        assert_eq!(request.transaction_details.order_id, "BA-AB12CD34-1708012345");
        assert_eq!(request.transaction_details.gross_amount, 250_000);
        assert_eq!(request.item_details[0].price, 250_000);
        assert_eq!(request.item_details[0].name, "Makeup Class: Bridal Makeup");
        assert_eq!(request.enabled_payments, vec!["gopay"]);
    }

    #[test]
    fn absent_phone_is_omitted_from_payload() {
        let request = snap_request(&checkout(), &[], 1);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["customer_details"].get("phone").is_none());
        assert_eq!(json["customer_details"]["email"], "sari@example.com");
    }
}
