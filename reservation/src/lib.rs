mod manager;
mod pricing;
mod retry;
mod store;
mod sweeper;

use abi::{
    Actor, Canceller, Error, Pager, QuoteResponse, Reservation, ReservationDetails,
    ReservationFilter, ReservationId, ReserveRequest, StayPolicy,
};
use async_trait::async_trait;

pub use pricing::PricingCalculator;
pub use retry::{retry_on_conflict, RetryPolicy};
pub use store::{
    settle, BookingStore, Boundary, Directory, Inventory, Ledger, MemoryStore, MemoryTx, PgStore,
    PgTx, PriceLookup, Snapshot, UnitOfWork,
};
pub use sweeper::{StatusSweeper, SweepReport};

/// Booking transaction coordinator over an injected store.
#[derive(Debug, Clone)]
pub struct ReservationManager<S> {
    store: S,
    pricing: PricingCalculator,
    stay: StayPolicy,
}

#[async_trait]
pub trait Rsvp {
    /// book the requested rooms for the acting guest, all or nothing
    async fn reserve_hotel_room(
        &self,
        actor: &Actor,
        request: ReserveRequest,
    ) -> Result<ReservationId, Error>;
    /// price a request without booking anything
    async fn quote(&self, request: ReserveRequest) -> Result<QuoteResponse, Error>;
    /// move a confirmed or active reservation to a cancelled status, acting
    /// as the hotel owner, the guest who booked it, or an admin
    async fn cancel(
        &self,
        actor: &Actor,
        id: ReservationId,
        canceller: Canceller,
    ) -> Result<Reservation, Error>;
    /// get a reservation with its rooms by id, for its guest, its hotel owner or an admin
    async fn get(&self, actor: &Actor, id: ReservationId) -> Result<ReservationDetails, Error>;
    /// list reservations of the hotels the actor owns, ordered by reservation id
    async fn filter(
        &self,
        actor: &Actor,
        filter: ReservationFilter,
    ) -> Result<(Pager, Vec<Reservation>), Error>;
}
