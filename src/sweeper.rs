use std::time::Duration;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use tokio::task::JoinHandle;

use crate::error::BookingError;
use crate::ledger::Ledger;
use crate::models::BookingStatus;
use crate::reservation;
use crate::schema::{bookings, schedules};

/// Finishes every confirmed booking whose schedule ended before now.
pub async fn sweep_finished(ledger: &Ledger) -> Result<usize, BookingError> {
    sweep_finished_at(ledger, reservation::now()).await
}

/// Same as [`sweep_finished`] with an explicit clock reading (UTC). One
/// conditional `UPDATE` keyed on the current status, so overlapping sweeps
/// never finish a booking twice.
pub async fn sweep_finished_at(ledger: &Ledger, now: NaiveDateTime) -> Result<usize, BookingError> {
    let count = ledger
        .transaction(move |conn| {
            let ended = schedules::table
                .filter(schedules::end_time.lt(now))
                .select(schedules::id);
            let finished = diesel::update(
                bookings::table
                    .filter(bookings::status.eq(BookingStatus::Confirmed))
                    .filter(bookings::deleted_at.is_null())
                    .filter(bookings::schedule_id.eq_any(ended)),
            )
            .set(bookings::status.eq(BookingStatus::Finished))
            .execute(conn)?;
            Ok(finished)
        })
        .await?;

    tracing::info!(count, "marked bookings as finished");
    Ok(count)
}

/// Runs [`sweep_finished`] every `interval` until the task is aborted.
pub fn spawn(ledger: Ledger, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = sweep_finished(&ledger).await {
                tracing::error!(error = %err, "booking sweep failed");
            }
        }
    })
}
