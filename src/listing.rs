//! Booking history, newest first.

use diesel::prelude::*;

use crate::auth::Actor;
use crate::dtos::{BookingView, Page};
use crate::error::BookingError;
use crate::ledger::Ledger;
use crate::models::{Booking, Payment, Schedule};
use crate::schema::{bookings, payments, schedules};

pub const DEFAULT_PER_PAGE: i64 = 15;
pub const MAX_PER_PAGE: i64 = 100;

/// Admins see every booking and may filter by user; everyone else sees their own.
pub async fn list_bookings(
    ledger: &Ledger,
    actor: Actor,
    user_filter: Option<i32>,
    page: Option<i64>,
    per_page: Option<i64>,
) -> Result<Page<BookingView>, BookingError> {
    let page = page.unwrap_or(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE);
    let offset = page_offset(page, per_page)?;

    let owner = if actor.role.is_admin() {
        user_filter
    } else {
        Some(actor.user_id)
    };

    ledger
        .read(move |conn| {
            let mut counted = bookings::table
                .filter(bookings::deleted_at.is_null())
                .into_boxed();
            let mut listed = bookings::table
                .inner_join(schedules::table)
                .inner_join(payments::table)
                .filter(bookings::deleted_at.is_null())
                .into_boxed();
            if let Some(owner) = owner {
                counted = counted.filter(bookings::user_id.eq(owner));
                listed = listed.filter(bookings::user_id.eq(owner));
            }

            let total = counted.count().get_result::<i64>(conn)?;
            let data = listed
                .order(bookings::id.desc())
                .limit(per_page)
                .offset(offset)
                .select((
                    Booking::as_select(),
                    Schedule::as_select(),
                    Payment::as_select(),
                ))
                .load::<(Booking, Schedule, Payment)>(conn)?
                .into_iter()
                .map(|(booking, schedule, payment)| BookingView {
                    booking,
                    schedule,
                    payment,
                })
                .collect();

            Ok(Page {
                data,
                page,
                per_page,
                total,
            })
        })
        .await
}

/// Rows to skip for a 1-based `page`.
fn page_offset(page: i64, per_page: i64) -> Result<i64, BookingError> {
    if page < 1 {
        return Err(BookingError::Validation("page must be at least 1".to_owned()));
    }
    if !(1..=MAX_PER_PAGE).contains(&per_page) {
        return Err(BookingError::Validation(format!(
            "per_page must be between 1 and {MAX_PER_PAGE}"
        )));
    }
    (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| BookingError::Validation("page is out of range".to_owned()))
}
