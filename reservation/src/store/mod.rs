mod memory;
mod postgres;

use abi::{
    Country, CountryId, Error, GuestId, Hotel, HotelId, NewReservation, Reservation,
    ReservationDetails, ReservationFilter, ReservationId, ReservationStatus, ReservedRoomType,
    Room, RoomAssignment, RoomType, RoomTypeId, StaySpan, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

pub use memory::{MemoryStore, MemoryTx, Snapshot};
pub use postgres::{PgStore, PgTx};

/// Read-mostly lookups of records owned by other parts of the platform.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn hotel(&self, id: HotelId) -> Result<Hotel, Error>;
    async fn country(&self, id: CountryId) -> Result<Country, Error>;
    /// the guest profile of a user, if they have one
    async fn guest_for_user(&self, user_id: UserId) -> Result<Option<GuestId>, Error>;
    /// ids of the hotels a user owns, ascending
    async fn hotels_owned_by(&self, user_id: UserId) -> Result<Vec<HotelId>, Error>;
    async fn is_admin(&self, user_id: UserId) -> Result<bool, Error>;
}

#[async_trait]
pub trait PriceLookup: Send {
    /// A bookable room type; hidden or deleted ones are `RoomTypeNotFound`.
    async fn room_type(&mut self, id: RoomTypeId) -> Result<RoomType, Error>;
}

#[async_trait]
pub trait Inventory: Send {
    /// Visible rooms of the type not held by a blocking reservation that
    /// overlaps `span`, lowest room code first. Only as fresh as the
    /// enclosing transaction.
    async fn find_available_rooms(
        &mut self,
        room_type_id: RoomTypeId,
        span: &StaySpan,
    ) -> Result<Vec<Room>, Error>;
}

/// Append-only writes that make a booking durable.
#[async_trait]
pub trait Ledger: Send {
    async fn create_reservation(&mut self, rsvp: NewReservation) -> Result<Reservation, Error>;

    /// Rejects a room type of another hotel and a room type attached twice.
    async fn attach_room_type(
        &mut self,
        rsvp: &Reservation,
        room_type_id: RoomTypeId,
        nb_rooms: i32,
    ) -> Result<ReservedRoomType, Error>;

    async fn assign_room(
        &mut self,
        line: &ReservedRoomType,
        room: &Room,
    ) -> Result<RoomAssignment, Error>;
}

/// One transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait UnitOfWork: PriceLookup + Inventory + Ledger + Sized {
    async fn commit(self) -> Result<(), Error>;
    async fn rollback(self) -> Result<(), Error>;
}

/// Which end of a stay a sweep compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    CheckIn,
    CheckOut,
}

#[async_trait]
pub trait BookingStore: Directory + Clone + 'static {
    type Tx: UnitOfWork + 'static;

    async fn begin(&self) -> Result<Self::Tx, Error>;

    /// A transaction in which no two concurrent bookings can both commit
    /// results that contradict each other.
    async fn begin_serializable(&self) -> Result<Self::Tx, Error>;

    async fn reservation(&self, id: ReservationId) -> Result<ReservationDetails, Error>;

    async fn filter(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, Error>;

    /// ids of reservations in `status` whose `boundary` is at or before `now`
    async fn due_reservations(
        &self,
        status: ReservationStatus,
        boundary: Boundary,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReservationId>, Error>;

    /// Set the status only if the current one is in `from`. `None` when the
    /// reservation is missing or in another status.
    async fn update_status(
        &self,
        id: ReservationId,
        from: &[ReservationStatus],
        to: ReservationStatus,
    ) -> Result<Option<Reservation>, Error>;
}

/// Commit on success, roll back on failure.
pub async fn settle<T, X: UnitOfWork>(tx: X, outcome: Result<T, Error>) -> Result<T, Error> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "failed to roll back transaction");
            }
            Err(e)
        }
    }
}
