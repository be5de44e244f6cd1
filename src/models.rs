use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::{
    backend::Backend,
    deserialize::{self, FromSql},
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
    sqlite::Sqlite,
    AsExpression, FromSqlRow,
};
use serde::{Deserialize, Serialize};

/// A status string read from the database or the gateway that has no enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status `{0}`")]
pub struct UnknownStatus(pub String);

/// Stores a string-backed enum in a `TEXT` column through its `as_str`/`FromStr` pair.
macro_rules! text_column_enum {
    ($ty:ty) => {
        impl ToSql<Text, Sqlite> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.as_str());
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Sqlite> for $ty {
            fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                Ok(raw.parse::<$ty>()?)
            }
        }
    };
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Finished,
}

impl BookingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Finished => "finished",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "finished" => Ok(Self::Finished),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

text_column_enum!(BookingStatus);

/// Payment state as reported by the gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Capture,
    Settlement,
    Challenge,
    Deny,
    Expire,
    Cancel,
}

impl TransactionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Capture => "capture",
            Self::Settlement => "settlement",
            Self::Challenge => "challenge",
            Self::Deny => "deny",
            Self::Expire => "expire",
            Self::Cancel => "cancel",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "capture" => Ok(Self::Capture),
            "settlement" => Ok(Self::Settlement),
            "challenge" => Ok(Self::Challenge),
            "deny" => Ok(Self::Deny),
            "expire" => Ok(Self::Expire),
            "cancel" => Ok(Self::Cancel),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

text_column_enum!(TransactionStatus);

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::services)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Service {
    pub id: i32,
    pub name: String,
    pub price: i64,
    #[serde(skip)]
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = crate::schema::services)]
pub struct NewService {
    pub name: String,
    pub price: i64,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = crate::schema::instructors)]
pub struct NewInstructor {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::schedules)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Schedule {
    pub id: i32,
    pub service_id: i32,
    pub instructor_id: i32,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub total_capacity: i32,
    pub remaining_slots: i32,
    #[serde(skip)]
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = crate::schema::schedules)]
pub struct NewSchedule {
    pub service_id: i32,
    pub instructor_id: i32,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub total_capacity: i32,
    pub remaining_slots: i32,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::bookings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Booking {
    pub id: i32,
    pub user_id: i32,
    pub schedule_id: i32,
    pub booking_code: String,
    pub status: BookingStatus,
    pub total_price: i64,
    pub booking_date: NaiveDateTime,
    #[serde(skip)]
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewBooking<'a> {
    pub user_id: i32,
    pub schedule_id: i32,
    pub booking_code: &'a str,
    pub status: BookingStatus,
    pub total_price: i64,
    pub booking_date: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Payment {
    pub id: i32,
    pub booking_id: i32,
    pub transaction_id: Option<String>,
    pub payment_type: String,
    pub gross_amount: i64,
    pub transaction_status: TransactionStatus,
    pub fraud_status: Option<String>,
    pub snap_token: Option<String>,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::payments)]
pub struct NewPayment<'a> {
    pub booking_id: i32,
    pub payment_type: &'a str,
    pub gross_amount: i64,
    pub transaction_status: TransactionStatus,
    pub updated_at: NaiveDateTime,
}
