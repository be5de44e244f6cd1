use crate::models::{Booking, Payment, Schedule};
use crate::reservation::Reservation;

#[derive(serde::Deserialize)]
pub struct CreateBookingRequest {
    pub schedule_id: i32,
}

#[derive(serde::Deserialize, Default)]
pub struct ListBookingsQuery {
    pub user_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// A booking with its payment and a snapshot of its schedule.
#[derive(Debug, serde::Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub schedule: Schedule,
    pub payment: Payment,
}

impl From<Reservation> for BookingView {
    fn from(reservation: Reservation) -> Self {
        Self {
            booking: reservation.booking,
            schedule: reservation.schedule,
            payment: reservation.payment,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

#[derive(Debug, serde::Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
