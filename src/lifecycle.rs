//! Booking lifecycle.
//!
//! ```text
//! pending ──► confirmed ──► finished
//!    │            │
//!    └──► cancelled ◄┘
//! ```
//!
//! `finished` and `cancelled` are terminal. User-facing operations turn an
//! illegal transition into a conflict error; the sweeper and the gateway
//! reconciliation treat it as a no-op.

use crate::error::BookingError;
use crate::models::BookingStatus;

impl BookingStatus {
    /// Whether the booking still holds a slot.
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Finished)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Finished)
                | (Self::Confirmed, Self::Cancelled)
        )
    }
}

/// Checks a user-requested cancellation against the current status.
pub fn ensure_cancellable(current: BookingStatus) -> Result<(), BookingError> {
    match current {
        BookingStatus::Cancelled => Err(BookingError::AlreadyCancelled),
        BookingStatus::Finished => Err(BookingError::AlreadyFinished),
        BookingStatus::Pending | BookingStatus::Confirmed => Ok(()),
    }
}

/// Checks that a booking can still be paid for.
pub fn ensure_payable(current: BookingStatus) -> Result<(), BookingError> {
    match current {
        BookingStatus::Pending => Ok(()),
        BookingStatus::Confirmed | BookingStatus::Finished => Err(BookingError::AlreadyConfirmed),
        BookingStatus::Cancelled => Err(BookingError::AlreadyCancelled),
    }
}

/// Resolves a system-driven transition: `Some(next)` when it applies, `None` when
/// it would be a no-op or is not allowed from `current`.
pub fn advance(current: BookingStatus, next: BookingStatus) -> Option<BookingStatus> {
    current.can_transition_to(next).then_some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use BookingStatus::{Cancelled, Confirmed, Finished, Pending};

    #[rstest]
    #[case(Pending, Confirmed, true)]
    #[case(Pending, Cancelled, true)]
    #[case(Confirmed, Finished, true)]
    #[case(Confirmed, Cancelled, true)]
    #[case(Pending, Finished, false)]
    #[case(Confirmed, Pending, false)]
    #[case(Finished, Confirmed, false)]
    #[case(Finished, Cancelled, false)]
    #[case(Cancelled, Confirmed, false)]
    #[case(Cancelled, Cancelled, false)]
    fn transition_table(
        #[case] from: BookingStatus,
        #[case] to: BookingStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_cancelled_bookings_release_their_slot() {
        assert!(Pending.is_active());
        assert!(Confirmed.is_active());
        assert!(Finished.is_active());
        assert!(!Cancelled.is_active());
    }

    #[test]
    fn terminal_states_never_advance() {
        for terminal in [Cancelled, Finished] {
            assert!(terminal.is_terminal());
            for next in [Pending, Confirmed, Cancelled, Finished] {
                assert_eq!(advance(terminal, next), None);
            }
        }
    }

    #[test]
    fn cancellation_of_a_cancelled_booking_is_a_conflict() {
        assert!(matches!(
            ensure_cancellable(Cancelled),
            Err(BookingError::AlreadyCancelled)
        ));
        assert!(ensure_cancellable(Confirmed).is_ok());
    }

    #[test]
    fn only_pending_bookings_are_payable() {
        assert!(ensure_payable(Pending).is_ok());
        assert!(matches!(
            ensure_payable(Confirmed),
            Err(BookingError::AlreadyConfirmed)
        ));
        assert!(matches!(
            ensure_payable(Cancelled),
            Err(BookingError::AlreadyCancelled)
        ));
    }
}
