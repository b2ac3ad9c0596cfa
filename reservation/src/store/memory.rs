use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use abi::{
    BookedRooms, Country, CountryId, Error, GuestId, Hotel, HotelId, NewReservation, Reservation,
    ReservationDetails, ReservationFilter, ReservationId, ReservationStatus, ReservedRoomType,
    ReservedRoomTypeId, Room, RoomAssignment, RoomId, RoomStatus, RoomType, RoomTypeId,
    RoomTypeStatus, StaySpan, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{BookingStore, Boundary, Directory, Inventory, Ledger, PriceLookup, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i64,
    hotels: BTreeMap<HotelId, Hotel>,
    countries: BTreeMap<CountryId, Country>,
    guests: BTreeMap<UserId, GuestId>,
    admins: BTreeSet<UserId>,
    room_types: BTreeMap<RoomTypeId, RoomType>,
    rooms: BTreeMap<RoomId, Room>,
    reservations: BTreeMap<ReservationId, Reservation>,
    reserved_room_types: BTreeMap<ReservedRoomTypeId, ReservedRoomType>,
    assignments: BTreeMap<i64, RoomAssignment>,
}

/// Committed ledger rows, for checking invariants from the outside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub reservations: Vec<Reservation>,
    pub reserved_room_types: Vec<ReservedRoomType>,
    pub assignments: Vec<RoomAssignment>,
}

/// In-process store. A transaction holds the store lock until it settles,
/// so transactions run one at a time and are trivially serializable.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
    conflicts: Arc<AtomicUsize>,
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    conflicts: Arc<AtomicUsize>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn bookable_room_type(&self, id: RoomTypeId) -> Result<&RoomType, Error> {
        self.room_types
            .get(&id)
            .filter(|rt| rt.is_bookable())
            .ok_or(Error::RoomTypeNotFound(id))
    }

    fn is_blocked(&self, room_id: RoomId, span: &StaySpan) -> bool {
        self.assignments
            .values()
            .filter(|a| a.room_id == room_id)
            .filter_map(|a| self.reserved_room_types.get(&a.reserved_room_type_id))
            .filter_map(|line| self.reservations.get(&line.reservation_id))
            .any(|rsvp| rsvp.blocks(span))
    }

    fn details(&self, reservation: Reservation) -> ReservationDetails {
        let rooms = self
            .reserved_room_types
            .values()
            .filter(|line| line.reservation_id == reservation.id)
            .map(|line| BookedRooms {
                room_type_id: line.room_type_id,
                nb_rooms: line.nb_rooms,
                room_ids: self
                    .assignments
                    .values()
                    .filter(|a| a.reserved_room_type_id == line.id)
                    .map(|a| a.room_id)
                    .collect(),
            })
            .collect();
        ReservationDetails { reservation, rooms }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail as if a concurrent booking won.
    pub fn inject_conflicts(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    pub async fn add_hotel(&self, name: &str, owner_user_id: UserId) -> HotelId {
        let mut tables = self.inner.lock().await;
        let id = tables.next_id();
        tables.hotels.insert(
            id,
            Hotel {
                id,
                name: name.to_string(),
                owner_user_id,
            },
        );
        id
    }

    pub async fn add_admin(&self, user_id: UserId) {
        self.inner.lock().await.admins.insert(user_id);
    }

    pub async fn add_country(&self, name: &str, country_code: Option<&str>) -> CountryId {
        let mut tables = self.inner.lock().await;
        let id = tables.next_id();
        tables.countries.insert(
            id,
            Country {
                id,
                name: name.to_string(),
                country_code: country_code.map(str::to_string),
            },
        );
        id
    }

    pub async fn add_guest(&self, user_id: UserId) -> GuestId {
        let mut tables = self.inner.lock().await;
        let id = tables.next_id();
        tables.guests.insert(user_id, id);
        id
    }

    pub async fn add_room_type(
        &self,
        hotel_id: HotelId,
        name: &str,
        price_per_night: i64,
    ) -> RoomTypeId {
        let mut tables = self.inner.lock().await;
        let id = tables.next_id();
        tables.room_types.insert(
            id,
            RoomType {
                id,
                hotel_id,
                name: name.to_string(),
                price_per_night,
                number_of_guests: 2,
                status: RoomTypeStatus::Visible,
            },
        );
        id
    }

    /// Adds `count` visible rooms numbered from 101.
    pub async fn add_rooms(&self, room_type_id: RoomTypeId, count: usize) -> Vec<RoomId> {
        let mut tables = self.inner.lock().await;
        let existing = tables
            .rooms
            .values()
            .filter(|r| r.room_type_id == room_type_id)
            .count();
        (0..count)
            .map(|i| {
                let id = tables.next_id();
                tables.rooms.insert(
                    id,
                    Room {
                        id,
                        room_type_id,
                        code: (101 + existing + i) as i32,
                        status: RoomStatus::Visible,
                    },
                );
                id
            })
            .collect()
    }

    pub async fn set_room_type_status(&self, id: RoomTypeId, status: RoomTypeStatus) {
        if let Some(rt) = self.inner.lock().await.room_types.get_mut(&id) {
            rt.status = status;
        }
    }

    pub async fn set_room_status(&self, id: RoomId, status: RoomStatus) {
        if let Some(room) = self.inner.lock().await.rooms.get_mut(&id) {
            room.status = status;
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        let tables = self.inner.lock().await;
        Snapshot {
            reservations: tables.reservations.values().cloned().collect(),
            reserved_room_types: tables.reserved_room_types.values().cloned().collect(),
            assignments: tables.assignments.values().cloned().collect(),
        }
    }

    async fn open(&self) -> MemoryTx {
        let guard = self.inner.clone().lock_owned().await;
        let staged = guard.clone();
        MemoryTx {
            guard,
            staged,
            conflicts: self.conflicts.clone(),
        }
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn hotel(&self, id: HotelId) -> Result<Hotel, Error> {
        let tables = self.inner.lock().await;
        tables.hotels.get(&id).cloned().ok_or(Error::HotelNotFound(id))
    }

    async fn country(&self, id: CountryId) -> Result<Country, Error> {
        let tables = self.inner.lock().await;
        tables
            .countries
            .get(&id)
            .cloned()
            .ok_or(Error::CountryNotFound(id))
    }

    async fn guest_for_user(&self, user_id: UserId) -> Result<Option<GuestId>, Error> {
        Ok(self.inner.lock().await.guests.get(&user_id).copied())
    }

    async fn hotels_owned_by(&self, user_id: UserId) -> Result<Vec<HotelId>, Error> {
        let tables = self.inner.lock().await;
        Ok(tables
            .hotels
            .values()
            .filter(|h| h.owner_user_id == user_id)
            .map(|h| h.id)
            .collect())
    }

    async fn is_admin(&self, user_id: UserId) -> Result<bool, Error> {
        Ok(self.inner.lock().await.admins.contains(&user_id))
    }
}

#[async_trait]
impl PriceLookup for MemoryTx {
    async fn room_type(&mut self, id: RoomTypeId) -> Result<RoomType, Error> {
        self.staged.bookable_room_type(id).cloned()
    }
}

#[async_trait]
impl Inventory for MemoryTx {
    async fn find_available_rooms(
        &mut self,
        room_type_id: RoomTypeId,
        span: &StaySpan,
    ) -> Result<Vec<Room>, Error> {
        let tables = &self.staged;
        tables.bookable_room_type(room_type_id)?;

        let mut rooms: Vec<Room> = tables
            .rooms
            .values()
            .filter(|r| r.room_type_id == room_type_id && r.status == RoomStatus::Visible)
            .filter(|r| !tables.is_blocked(r.id, span))
            .cloned()
            .collect();
        rooms.sort_by_key(|r| (r.code, r.id));
        Ok(rooms)
    }
}

#[async_trait]
impl Ledger for MemoryTx {
    async fn create_reservation(&mut self, rsvp: NewReservation) -> Result<Reservation, Error> {
        let tables = &mut self.staged;
        if rsvp.span.check_in >= rsvp.span.check_out {
            return Err(Error::IntegrityViolation(
                "reservation check-in must precede check-out".into(),
            ));
        }
        if !tables.hotels.contains_key(&rsvp.hotel_id) {
            return Err(Error::IntegrityViolation(format!(
                "hotel {} does not exist",
                rsvp.hotel_id
            )));
        }
        let id = tables.next_id();
        let reservation = Reservation {
            id,
            guest_id: rsvp.guest_id,
            hotel_id: rsvp.hotel_id,
            contact: rsvp.contact,
            check_in: rsvp.span.check_in,
            check_out: rsvp.span.check_out,
            total_price: rsvp.total_price,
            commission: rsvp.commission,
            status: ReservationStatus::Confirmed,
            created_at: Utc::now(),
        };
        tables.reservations.insert(id, reservation.clone());
        Ok(reservation)
    }

    async fn attach_room_type(
        &mut self,
        rsvp: &Reservation,
        room_type_id: RoomTypeId,
        nb_rooms: i32,
    ) -> Result<ReservedRoomType, Error> {
        let tables = &mut self.staged;
        let hotel_id = tables
            .room_types
            .get(&room_type_id)
            .map(|rt| rt.hotel_id)
            .ok_or(Error::RoomTypeNotFound(room_type_id))?;
        if hotel_id != rsvp.hotel_id {
            return Err(Error::IntegrityViolation(format!(
                "room type {} belongs to hotel {}, reservation {} is for hotel {}",
                room_type_id, hotel_id, rsvp.id, rsvp.hotel_id
            )));
        }
        if !tables.reservations.contains_key(&rsvp.id) {
            return Err(Error::IntegrityViolation(format!(
                "reservation {} does not exist",
                rsvp.id
            )));
        }
        if nb_rooms < 1 {
            return Err(Error::IntegrityViolation(format!(
                "invalid room count {}",
                nb_rooms
            )));
        }
        let duplicate = tables
            .reserved_room_types
            .values()
            .any(|line| line.reservation_id == rsvp.id && line.room_type_id == room_type_id);
        if duplicate {
            return Err(Error::IntegrityViolation(format!(
                "room type {} is already attached to reservation {}",
                room_type_id, rsvp.id
            )));
        }

        let id = tables.next_id();
        let line = ReservedRoomType {
            id,
            reservation_id: rsvp.id,
            room_type_id,
            nb_rooms,
        };
        tables.reserved_room_types.insert(id, line.clone());
        Ok(line)
    }

    async fn assign_room(
        &mut self,
        line: &ReservedRoomType,
        room: &Room,
    ) -> Result<RoomAssignment, Error> {
        let tables = &mut self.staged;
        if !tables.reserved_room_types.contains_key(&line.id)
            || !tables.rooms.contains_key(&room.id)
        {
            return Err(Error::IntegrityViolation(format!(
                "cannot assign room {} to line {}",
                room.id, line.id
            )));
        }
        let duplicate = tables
            .assignments
            .values()
            .any(|a| a.reserved_room_type_id == line.id && a.room_id == room.id);
        if duplicate {
            return Err(Error::IntegrityViolation(format!(
                "room {} is already assigned to line {}",
                room.id, line.id
            )));
        }

        let id = tables.next_id();
        let assignment = RoomAssignment {
            id,
            reserved_room_type_id: line.id,
            room_id: room.id,
        };
        tables.assignments.insert(id, assignment.clone());
        Ok(assignment)
    }
}

#[async_trait]
impl UnitOfWork for MemoryTx {
    async fn commit(self) -> Result<(), Error> {
        let MemoryTx {
            mut guard,
            staged,
            conflicts,
        } = self;
        let injected = conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::TransactionConflict);
        }
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), Error> {
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, Error> {
        Ok(self.open().await)
    }

    async fn begin_serializable(&self) -> Result<MemoryTx, Error> {
        Ok(self.open().await)
    }

    async fn reservation(&self, id: ReservationId) -> Result<ReservationDetails, Error> {
        let tables = self.inner.lock().await;
        let reservation = tables
            .reservations
            .get(&id)
            .cloned()
            .ok_or(Error::ReservationNotFound(id))?;
        Ok(tables.details(reservation))
    }

    async fn filter(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, Error> {
        let tables = self.inner.lock().await;
        let matching = tables.reservations.values().filter(|r| filter.matches(r));
        let limit = (filter.page_size + 1).max(0) as usize;
        let reservations: Vec<Reservation> = if filter.desc {
            matching.rev().take(limit).cloned().collect()
        } else {
            matching.take(limit).cloned().collect()
        };
        Ok(reservations)
    }

    async fn due_reservations(
        &self,
        status: ReservationStatus,
        boundary: Boundary,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReservationId>, Error> {
        let tables = self.inner.lock().await;
        Ok(tables
            .reservations
            .values()
            .filter(|r| r.status == status)
            .filter(|r| match boundary {
                Boundary::CheckIn => r.check_in <= now,
                Boundary::CheckOut => r.check_out <= now,
            })
            .map(|r| r.id)
            .collect())
    }

    async fn update_status(
        &self,
        id: ReservationId,
        from: &[ReservationStatus],
        to: ReservationStatus,
    ) -> Result<Option<Reservation>, Error> {
        let mut tables = self.inner.lock().await;
        Ok(tables
            .reservations
            .get_mut(&id)
            .filter(|r| from.contains(&r.status))
            .map(|r| {
                r.status = to;
                r.clone()
            }))
    }
}
