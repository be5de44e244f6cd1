//! Slot reservation: claims and returns units of schedule capacity.
//!
//! Invariant kept by every function here: for each schedule,
//! `remaining_slots + active bookings == total_capacity`. Each operation runs as
//! one [`Ledger::transaction`], so the availability check, the duplicate check
//! and the writes observe a single consistent snapshot.

use chrono::{NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::SqliteConnection;
use rand::Rng;

use crate::auth::Actor;
use crate::error::{BookingError, ErrorKind};
use crate::ledger::Ledger;
use crate::lifecycle;
use crate::models::{
    Booking, BookingStatus, NewBooking, NewPayment, Payment, Schedule, TransactionStatus,
};
use crate::schema::{bookings, payments, schedules, services};

pub const CODE_PREFIX: &str = "BA-";
const CODE_BODY_LEN: usize = 8;
/// Length of a booking code, e.g. `BA-AB12CD34`.
pub const CODE_LEN: usize = CODE_PREFIX.len() + CODE_BODY_LEN;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: usize = 5;

/// Payment type recorded until the gateway reports how the customer paid.
pub const UNDECIDED_PAYMENT_TYPE: &str = "tbd";

/// A freshly created booking together with its payment and the schedule after the decrement.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub booking: Booking,
    pub payment: Payment,
    pub schedule: Schedule,
}

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let body: String = (0..CODE_BODY_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect();
    format!("{CODE_PREFIX}{body}")
}

/// Books one slot of `schedule_id` for `user_id`.
///
/// The booking price is a snapshot of the service price at this moment. The
/// booking starts `pending` with a `pending` payment of type `tbd`.
pub async fn reserve(
    ledger: &Ledger,
    schedule_id: i32,
    user_id: i32,
) -> Result<Reservation, BookingError> {
    let result = ledger
        .transaction(move |conn| reserve_locked(conn, schedule_id, user_id, now()))
        .await;

    match &result {
        Ok(reservation) => tracing::info!(
            booking_code = %reservation.booking.booking_code,
            schedule_id,
            user_id,
            remaining_slots = reservation.schedule.remaining_slots,
            "reservation accepted"
        ),
        Err(err) if err.kind() == ErrorKind::Conflict || err.kind() == ErrorKind::NotFound => {
            tracing::info!(schedule_id, user_id, reason = %err, "reservation rejected")
        }
        Err(_) => {}
    }
    result
}

fn reserve_locked(
    conn: &mut SqliteConnection,
    schedule_id: i32,
    user_id: i32,
    now: NaiveDateTime,
) -> Result<Reservation, BookingError> {
    let schedule = schedules::table
        .find(schedule_id)
        .filter(schedules::deleted_at.is_null())
        .select(Schedule::as_select())
        .first(conn)
        .optional()?
        .ok_or(BookingError::ScheduleNotFound)?;

    if schedule.remaining_slots <= 0 {
        return Err(BookingError::SlotUnavailable);
    }

    let already_booked = diesel::select(exists(
        bookings::table
            .filter(bookings::user_id.eq(user_id))
            .filter(bookings::schedule_id.eq(schedule_id))
            .filter(bookings::status.ne(BookingStatus::Cancelled))
            .filter(bookings::deleted_at.is_null()),
    ))
    .get_result::<bool>(conn)?;
    if already_booked {
        return Err(BookingError::DuplicateBooking);
    }

    let price = services::table
        .find(schedule.service_id)
        .select(services::price)
        .first::<i64>(conn)
        .optional()?
        .ok_or(BookingError::ScheduleNotFound)?;

    let schedule = diesel::update(schedules::table.find(schedule_id))
        .set(schedules::remaining_slots.eq(schedules::remaining_slots - 1))
        .returning(Schedule::as_returning())
        .get_result(conn)?;

    let code = fresh_code(conn)?;
    let booking = diesel::insert_into(bookings::table)
        .values(NewBooking {
            user_id,
            schedule_id,
            booking_code: &code,
            status: BookingStatus::Pending,
            total_price: price,
            booking_date: now,
        })
        .returning(Booking::as_returning())
        .get_result(conn)?;

    let payment = diesel::insert_into(payments::table)
        .values(NewPayment {
            booking_id: booking.id,
            payment_type: UNDECIDED_PAYMENT_TYPE,
            gross_amount: booking.total_price,
            transaction_status: TransactionStatus::Pending,
            updated_at: now,
        })
        .returning(Payment::as_returning())
        .get_result(conn)?;

    Ok(Reservation {
        booking,
        payment,
        schedule,
    })
}

/// Draws codes until one is unused. Runs under the transaction's write lock, so
/// an unused code cannot be taken before the insert.
fn fresh_code(conn: &mut SqliteConnection) -> Result<String, BookingError> {
    let mut rng = rand::thread_rng();
    for _ in 0..MAX_CODE_ATTEMPTS {
        let candidate = generate_code(&mut rng);
        let taken = diesel::select(exists(
            bookings::table.filter(bookings::booking_code.eq(&candidate)),
        ))
        .get_result::<bool>(conn)?;
        if !taken {
            return Ok(candidate);
        }
        tracing::warn!(code = %candidate, "booking code collision, drawing again");
    }
    Err(BookingError::CodeGeneration)
}

/// Cancels a booking on behalf of `actor` and returns its slot.
///
/// Only the owner or an administrator may cancel. A booking that is already
/// cancelled yields [`BookingError::AlreadyCancelled`] and nothing is written.
pub async fn release(ledger: &Ledger, booking_id: i32, actor: Actor) -> Result<(), BookingError> {
    let booking = ledger
        .transaction(move |conn| {
            let booking = bookings::table
                .find(booking_id)
                .filter(bookings::deleted_at.is_null())
                .select(Booking::as_select())
                .first(conn)
                .optional()?
                .ok_or(BookingError::BookingNotFound)?;

            if !actor.role.is_admin() && booking.user_id != actor.user_id {
                return Err(BookingError::Forbidden);
            }
            lifecycle::ensure_cancellable(booking.status)?;

            cancel_locked(conn, &booking, TransactionStatus::Cancel, now())?;
            Ok(booking)
        })
        .await?;

    tracing::info!(
        booking_code = %booking.booking_code,
        actor_id = actor.user_id,
        role = ?actor.role,
        "booking cancelled"
    );
    Ok(())
}

/// Marks `booking` cancelled, returns its slot and records `payment_status` on
/// its payment. Callers must hold the ledger transaction and must have checked
/// that the booking is still active; that check is what keeps the slot from
/// being returned twice.
pub(crate) fn cancel_locked(
    conn: &mut SqliteConnection,
    booking: &Booking,
    payment_status: TransactionStatus,
    now: NaiveDateTime,
) -> Result<(), BookingError> {
    diesel::update(bookings::table.find(booking.id))
        .set(bookings::status.eq(BookingStatus::Cancelled))
        .execute(conn)?;

    diesel::update(schedules::table.find(booking.schedule_id))
        .set(schedules::remaining_slots.eq(schedules::remaining_slots + 1))
        .execute(conn)?;

    diesel::update(payments::table.filter(payments::booking_id.eq(booking.id)))
        .set((
            payments::transaction_status.eq(payment_status),
            payments::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn codes_have_fixed_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.starts_with(CODE_PREFIX));
            assert!(code[CODE_PREFIX.len()..]
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn codes_differ_between_draws() {
        let mut rng = StdRng::seed_from_u64(42);
        let first = generate_code(&mut rng);
        let second = generate_code(&mut rng);
        assert_ne!(first, second);
    }
}
