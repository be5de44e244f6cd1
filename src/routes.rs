use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};

use crate::auth::Actor;
use crate::dtos::{BookingView, CreateBookingRequest, ListBookingsQuery, MessageResponse, Page};
use crate::error::BookingError;
use crate::gateway::{self, SessionToken};
use crate::reconciliation::{self, GatewayNotification};
use crate::{listing, reservation, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/bookings", get(list_bookings).post(create_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/payments/snap-token/:booking_id", get(snap_token))
        .route("/payments/callback", post(payment_callback))
        .with_state(state)
}

async fn health() -> Json<MessageResponse> {
    Json(MessageResponse::new("ok"))
}

async fn create_booking(
    actor: Actor,
    State(state): State<AppState>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingView>), BookingError> {
    let Json(request) = payload.map_err(|rejection| BookingError::Validation(rejection.body_text()))?;
    if request.schedule_id <= 0 {
        return Err(BookingError::Validation("schedule_id is invalid".to_owned()));
    }

    let reservation = reservation::reserve(&state.ledger, request.schedule_id, actor.user_id).await?;
    Ok((StatusCode::CREATED, Json(reservation.into())))
}

async fn list_bookings(
    actor: Actor,
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Json<Page<BookingView>>, BookingError> {
    let page = listing::list_bookings(
        &state.ledger,
        actor,
        query.user_id,
        query.page,
        query.per_page,
    )
    .await?;
    Ok(Json(page))
}

async fn cancel_booking(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, BookingError> {
    reservation::release(&state.ledger, id, actor).await?;
    Ok(Json(MessageResponse::new("Booking cancelled successfully")))
}

async fn snap_token(
    actor: Actor,
    State(state): State<AppState>,
    Path(booking_id): Path<i32>,
) -> Result<Json<SessionToken>, BookingError> {
    let token = gateway::issue_session_token(
        &state.ledger,
        state.gateway.as_ref(),
        &state.gateway_config,
        booking_id,
        actor,
    )
    .await?;
    Ok(Json(token))
}

/// Unauthenticated: trust comes from the notification signature alone.
async fn payment_callback(
    State(state): State<AppState>,
    payload: Result<Json<GatewayNotification>, JsonRejection>,
) -> Result<Json<MessageResponse>, BookingError> {
    let Json(notification) =
        payload.map_err(|rejection| BookingError::Validation(rejection.body_text()))?;
    reconciliation::handle_notification(
        &state.ledger,
        &state.gateway_config.server_key,
        notification,
    )
    .await?;
    Ok(Json(MessageResponse::new("Callback processed")))
}
