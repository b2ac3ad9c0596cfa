use std::sync::Arc;

use abi::{
    Actor, Canceller, Error, Pager, QuoteResponse, Reservation, ReservationDetails,
    ReservationFilter, ReservationId, ReserveRequest, ReserveResponse, UserId,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use reservation::{BookingStore, Rsvp};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::RsvpService;

/// Set by the authentication layer in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

type SharedService<S> = Arc<RsvpService<S>>;

/// The authenticated user a request acts for.
#[derive(Debug, Clone, Copy)]
pub struct ActingUser(pub Actor);

#[async_trait]
impl<T: Send + Sync> FromRequestParts<T> for ActingUser {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &T) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .map(|user_id| ActingUser(Actor { user_id }))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": "Authentication credentials were not provided" })),
                )
            })
    }
}

pub fn router<S: BookingStore>(svc: SharedService<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/hotels/reservations", post(reserve::<S>))
        .route("/hotels/reservations/quote", post(quote::<S>))
        .route("/reservations/:id", get(get_reservation::<S>))
        .route("/owner/reservations", get(list_reservations::<S>))
        .route("/owner/reservations/:id/cancel", put(cancel_by_owner::<S>))
        .route("/guest/reservations/:id/cancel", put(cancel_by_guest::<S>))
        .route("/admin/reservations/:id", delete(delete_by_admin::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(svc)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn reserve<S: BookingStore>(
    State(svc): State<SharedService<S>>,
    ActingUser(actor): ActingUser,
    Json(request): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReserveResponse>), Error> {
    let reservation_id = svc
        .manager
        .reserve_with_retry(&actor, request, &svc.retry)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ReserveResponse {
            detail: "Reservation created successfully".to_string(),
            reservation_id,
        }),
    ))
}

async fn quote<S: BookingStore>(
    State(svc): State<SharedService<S>>,
    Json(request): Json<ReserveRequest>,
) -> Result<Json<QuoteResponse>, Error> {
    Ok(Json(svc.manager.quote(request).await?))
}

async fn get_reservation<S: BookingStore>(
    State(svc): State<SharedService<S>>,
    ActingUser(actor): ActingUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationDetails>, Error> {
    Ok(Json(svc.manager.get(&actor, id).await?))
}

async fn list_reservations<S: BookingStore>(
    State(svc): State<SharedService<S>>,
    ActingUser(actor): ActingUser,
    Query(filter): Query<ReservationFilter>,
) -> Result<Json<Value>, Error> {
    let (pager, reservations): (Pager, Vec<Reservation>) =
        svc.manager.filter(&actor, filter).await?;
    Ok(Json(json!({ "pager": pager, "reservations": reservations })))
}

async fn cancel<S: BookingStore>(
    svc: &RsvpService<S>,
    actor: &Actor,
    id: ReservationId,
    canceller: Canceller,
) -> Result<Json<Reservation>, Error> {
    Ok(Json(svc.manager.cancel(actor, id, canceller).await?))
}

async fn cancel_by_owner<S: BookingStore>(
    State(svc): State<SharedService<S>>,
    ActingUser(actor): ActingUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, Error> {
    cancel(&svc, &actor, id, Canceller::Owner).await
}

async fn cancel_by_guest<S: BookingStore>(
    State(svc): State<SharedService<S>>,
    ActingUser(actor): ActingUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, Error> {
    cancel(&svc, &actor, id, Canceller::Guest).await
}

async fn delete_by_admin<S: BookingStore>(
    State(svc): State<SharedService<S>>,
    ActingUser(actor): ActingUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, Error> {
    cancel(&svc, &actor, id, Canceller::Admin).await
}
