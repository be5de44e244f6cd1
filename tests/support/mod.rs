//! Shared fixtures: a migrated SQLite ledger in a temporary directory plus
//! helpers to seed and inspect rows.
#![allow(dead_code)]

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use tempfile::TempDir;

use class_booking::ledger::Ledger;
use class_booking::models::{
    Booking, BookingStatus, NewInstructor, NewSchedule, NewService, NewUser, Payment, Schedule,
};
use class_booking::reconciliation::GatewayNotification;
use class_booking::schema::{bookings, instructors, payments, schedules, services, users};
use class_booking::simulate;

pub const SERVER_KEY: &str = "SB-Mid-server-test-key";
pub const PRICE: i64 = 250_000;

pub struct TestLedger {
    pub ledger: Ledger,
    _dir: TempDir,
}

impl std::ops::Deref for TestLedger {
    type Target = Ledger;

    fn deref(&self) -> &Ledger {
        &self.ledger
    }
}

pub async fn test_ledger() -> TestLedger {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("booking.db");
    let ledger = Ledger::connect(path.to_str().expect("utf-8 path"), 16, 10_000)
        .expect("build pool");
    ledger.run_migrations().await.expect("run migrations");
    TestLedger { ledger, _dir: dir }
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub async fn seed_user(ledger: &Ledger, name: &str) -> i32 {
    let name = name.to_owned();
    ledger
        .transaction(move |conn| {
            Ok(diesel::insert_into(users::table)
                .values(NewUser {
                    email: format!("{}@example.com", name.to_lowercase()),
                    name,
                    phone_number: Some("+628123456789".to_owned()),
                    role: "user".to_owned(),
                })
                .returning(users::id)
                .get_result::<i32>(conn)?)
        })
        .await
        .expect("seed user")
}

pub async fn seed_users(ledger: &Ledger, count: usize) -> Vec<i32> {
    let mut ids = Vec::with_capacity(count);
    for n in 0..count {
        ids.push(seed_user(ledger, &format!("user{n}")).await);
    }
    ids
}

/// Seeds a service, an instructor and a schedule running `start..end`.
pub async fn seed_schedule_between(
    ledger: &Ledger,
    capacity: i32,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> i32 {
    ledger
        .transaction(move |conn| {
            let service_id = diesel::insert_into(services::table)
                .values(NewService {
                    name: "Bridal Makeup".to_owned(),
                    price: PRICE,
                })
                .returning(services::id)
                .get_result::<i32>(conn)?;
            let instructor_id = diesel::insert_into(instructors::table)
                .values(NewInstructor {
                    name: "Dewi".to_owned(),
                })
                .returning(instructors::id)
                .get_result::<i32>(conn)?;
            Ok(diesel::insert_into(schedules::table)
                .values(NewSchedule {
                    service_id,
                    instructor_id,
                    start_time: start,
                    end_time: end,
                    total_capacity: capacity,
                    remaining_slots: capacity,
                })
                .returning(schedules::id)
                .get_result::<i32>(conn)?)
        })
        .await
        .expect("seed schedule")
}

/// A schedule starting tomorrow.
pub async fn seed_schedule(ledger: &Ledger, capacity: i32) -> i32 {
    let start = now() + Duration::days(1);
    seed_schedule_between(ledger, capacity, start, start + Duration::hours(2)).await
}

pub async fn schedule(ledger: &Ledger, id: i32) -> Schedule {
    ledger
        .read(move |conn| {
            Ok(schedules::table
                .find(id)
                .select(Schedule::as_select())
                .first(conn)?)
        })
        .await
        .expect("load schedule")
}

pub async fn booking(ledger: &Ledger, id: i32) -> Booking {
    ledger
        .read(move |conn| {
            Ok(bookings::table
                .find(id)
                .select(Booking::as_select())
                .first(conn)?)
        })
        .await
        .expect("load booking")
}

pub async fn payment_for(ledger: &Ledger, booking_id: i32) -> Payment {
    ledger
        .read(move |conn| {
            Ok(payments::table
                .filter(payments::booking_id.eq(booking_id))
                .select(Payment::as_select())
                .first(conn)?)
        })
        .await
        .expect("load payment")
}

pub async fn set_booking_status(ledger: &Ledger, id: i32, status: BookingStatus) {
    ledger
        .transaction(move |conn| {
            diesel::update(bookings::table.find(id))
                .set(bookings::status.eq(status))
                .execute(conn)?;
            Ok(())
        })
        .await
        .expect("update booking status");
}

/// Bookings of `schedule_id` that still hold a slot.
pub async fn active_bookings(ledger: &Ledger, schedule_id: i32) -> i64 {
    let statuses = ledger
        .read(move |conn| {
            Ok(bookings::table
                .filter(bookings::schedule_id.eq(schedule_id))
                .filter(bookings::deleted_at.is_null())
                .select(bookings::status)
                .load::<BookingStatus>(conn)?)
        })
        .await
        .expect("load booking statuses");
    statuses.into_iter().filter(|status| status.is_active()).count() as i64
}

/// `remaining_slots + active bookings == total_capacity`.
pub async fn assert_capacity_invariant(ledger: &Ledger, schedule_id: i32) {
    let schedule = schedule(ledger, schedule_id).await;
    let active = active_bookings(ledger, schedule_id).await;
    assert_eq!(
        i64::from(schedule.remaining_slots) + active,
        i64::from(schedule.total_capacity),
        "capacity invariant broken for schedule {schedule_id}"
    );
}

/// A correctly signed notification for `code`.
pub fn notification(code: &str, transaction_status: &str) -> GatewayNotification {
    notification_for_order(code, transaction_status, 1_708_012_345)
}

/// A correctly signed notification for the order `{code}-{suffix}`.
pub fn notification_for_order(
    code: &str,
    transaction_status: &str,
    suffix: i64,
) -> GatewayNotification {
    simulate::signed_notification(code, PRICE, transaction_status, SERVER_KEY, suffix)
}

pub fn notification_with_fraud(
    code: &str,
    transaction_status: &str,
    fraud_status: &str,
) -> GatewayNotification {
    let mut notification = notification(code, transaction_status);
    notification.fraud_status = Some(fraud_status.to_owned());
    notification
}
