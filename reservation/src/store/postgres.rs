use abi::{
    BookedRooms, Country, CountryId, DbConfig, Error, GuestId, Hotel, HotelId, NewReservation,
    Reservation, ReservationDetails, ReservationFilter, ReservationId, ReservationStatus,
    ReservedRoomType, Room, RoomAssignment, RoomType, RoomTypeId, StaySpan, ToSql, UserId,
    RESERVATION_COLUMNS,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};

use super::{BookingStore, Boundary, Directory, Inventory, Ledger, PriceLookup, UnitOfWork};

const ROOM_TYPE_COLUMNS: &str =
    "id, hotel_id, name, price_per_night, number_of_guests, status::text AS status";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn from_config(config: &DbConfig) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url())
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn hotel(&self, id: HotelId) -> Result<Hotel, Error> {
        sqlx::query_as::<_, Hotel>(
            "SELECT id, name, owner_user_id FROM rsvp.hotels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::HotelNotFound(id))
    }

    async fn country(&self, id: CountryId) -> Result<Country, Error> {
        sqlx::query_as::<_, Country>(
            "SELECT id, name, country_code FROM rsvp.countries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::CountryNotFound(id))
    }

    async fn guest_for_user(&self, user_id: UserId) -> Result<Option<GuestId>, Error> {
        let guest_id = sqlx::query_scalar::<_, GuestId>(
            "SELECT id FROM rsvp.guests WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(guest_id)
    }

    async fn hotels_owned_by(&self, user_id: UserId) -> Result<Vec<HotelId>, Error> {
        let ids = sqlx::query_scalar::<_, HotelId>(
            "SELECT id FROM rsvp.hotels WHERE owner_user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn is_admin(&self, user_id: UserId) -> Result<bool, Error> {
        let admin = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM rsvp.admins WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(admin)
    }
}

#[async_trait]
impl PriceLookup for PgTx {
    async fn room_type(&mut self, id: RoomTypeId) -> Result<RoomType, Error> {
        let sql = format!(
            "SELECT {} FROM rsvp.room_types WHERE id = $1",
            ROOM_TYPE_COLUMNS
        );
        sqlx::query_as::<_, RoomType>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .filter(RoomType::is_bookable)
            .ok_or(Error::RoomTypeNotFound(id))
    }
}

#[async_trait]
impl Inventory for PgTx {
    async fn find_available_rooms(
        &mut self,
        room_type_id: RoomTypeId,
        span: &StaySpan,
    ) -> Result<Vec<Room>, Error> {
        // unknown or hidden room types are not found, rather than empty
        self.room_type(room_type_id).await?;

        let rooms = sqlx::query_as::<_, Room>(
            r#"
            SELECT r.id, r.room_type_id, r.code, r.status::text AS status
            FROM rsvp.rooms r
            WHERE r.room_type_id = $1
              AND r.status = 'visible'
              AND NOT EXISTS (
                SELECT 1
                FROM rsvp.room_assignments a
                JOIN rsvp.reserved_room_types rrt ON rrt.id = a.reserved_room_type_id
                JOIN rsvp.reservations rs ON rs.id = rrt.reservation_id
                WHERE a.room_id = r.id
                  AND rs.status IN ('confirmed', 'active')
                  AND rs.check_in < $3
                  AND rs.check_out > $2
              )
            ORDER BY r.code, r.id
            "#,
        )
        .bind(room_type_id)
        .bind(span.check_in)
        .bind(span.check_out)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rooms)
    }
}

#[async_trait]
impl Ledger for PgTx {
    async fn create_reservation(&mut self, rsvp: NewReservation) -> Result<Reservation, Error> {
        let sql = format!(
            r#"
            INSERT INTO rsvp.reservations (guest_id, hotel_id, first_name, last_name, email,
                country_id, country_code_id, phone, check_in, check_out, total_price, commission)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        let reservation = sqlx::query_as::<_, Reservation>(&sql)
            .bind(rsvp.guest_id)
            .bind(rsvp.hotel_id)
            .bind(&rsvp.contact.first_name)
            .bind(&rsvp.contact.last_name)
            .bind(&rsvp.contact.email)
            .bind(rsvp.contact.country_id)
            .bind(rsvp.contact.country_code_id)
            .bind(rsvp.contact.phone)
            .bind(rsvp.span.check_in)
            .bind(rsvp.span.check_out)
            .bind(rsvp.total_price)
            .bind(rsvp.commission)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(reservation)
    }

    async fn attach_room_type(
        &mut self,
        rsvp: &Reservation,
        room_type_id: RoomTypeId,
        nb_rooms: i32,
    ) -> Result<ReservedRoomType, Error> {
        let hotel_id = sqlx::query_scalar::<_, HotelId>(
            "SELECT hotel_id FROM rsvp.room_types WHERE id = $1",
        )
        .bind(room_type_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(Error::RoomTypeNotFound(room_type_id))?;

        if hotel_id != rsvp.hotel_id {
            return Err(Error::IntegrityViolation(format!(
                "room type {} belongs to hotel {}, reservation {} is for hotel {}",
                room_type_id, hotel_id, rsvp.id, rsvp.hotel_id
            )));
        }

        // the unique (reservation_id, room_type_id) constraint reports duplicates
        let line = sqlx::query_as::<_, ReservedRoomType>(
            r#"
            INSERT INTO rsvp.reserved_room_types (reservation_id, room_type_id, nb_rooms)
            VALUES ($1, $2, $3)
            RETURNING id, reservation_id, room_type_id, nb_rooms
            "#,
        )
        .bind(rsvp.id)
        .bind(room_type_id)
        .bind(nb_rooms)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(line)
    }

    async fn assign_room(
        &mut self,
        line: &ReservedRoomType,
        room: &Room,
    ) -> Result<RoomAssignment, Error> {
        let assignment = sqlx::query_as::<_, RoomAssignment>(
            r#"
            INSERT INTO rsvp.room_assignments (reserved_room_type_id, room_id)
            VALUES ($1, $2)
            RETURNING id, reserved_room_type_id, room_id
            "#,
        )
        .bind(line.id)
        .bind(room.id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(assignment)
    }
}

#[async_trait]
impl UnitOfWork for PgTx {
    async fn commit(self) -> Result<(), Error> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), Error> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, Error> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }

    async fn begin_serializable(&self) -> Result<PgTx, Error> {
        let mut tx = self.pool.begin().await?;
        // must run before the first query of the transaction
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(PgTx { tx })
    }

    async fn reservation(&self, id: ReservationId) -> Result<ReservationDetails, Error> {
        let sql = format!(
            "SELECT {} FROM rsvp.reservations WHERE id = $1",
            RESERVATION_COLUMNS
        );
        let reservation = sqlx::query_as::<_, Reservation>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::ReservationNotFound(id))?;

        let rooms = sqlx::query_as::<_, BookedRooms>(
            r#"
            SELECT rrt.room_type_id, rrt.nb_rooms,
                COALESCE(
                    array_agg(a.room_id ORDER BY a.room_id) FILTER (WHERE a.room_id IS NOT NULL),
                    '{}'
                ) AS room_ids
            FROM rsvp.reserved_room_types rrt
            LEFT JOIN rsvp.room_assignments a ON a.reserved_room_type_id = rrt.id
            WHERE rrt.reservation_id = $1
            GROUP BY rrt.id, rrt.room_type_id, rrt.nb_rooms
            ORDER BY rrt.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ReservationDetails { reservation, rooms })
    }

    async fn filter(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, Error> {
        let sql = filter.to_sql();
        let reservations = sqlx::query_as::<_, Reservation>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(reservations)
    }

    async fn due_reservations(
        &self,
        status: ReservationStatus,
        boundary: Boundary,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReservationId>, Error> {
        let column = match boundary {
            Boundary::CheckIn => "check_in",
            Boundary::CheckOut => "check_out",
        };
        let sql = format!(
            "SELECT id FROM rsvp.reservations WHERE status = $1::rsvp.reservation_status AND {} <= $2 ORDER BY id",
            column
        );
        let ids = sqlx::query_scalar::<_, ReservationId>(&sql)
            .bind(status.to_string())
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn update_status(
        &self,
        id: ReservationId,
        from: &[ReservationStatus],
        to: ReservationStatus,
    ) -> Result<Option<Reservation>, Error> {
        let from: Vec<String> = from.iter().map(ToString::to_string).collect();
        let sql = format!(
            r#"
            UPDATE rsvp.reservations SET status = $1::rsvp.reservation_status
            WHERE id = $2 AND status::text = ANY($3)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        let reservation = sqlx::query_as::<_, Reservation>(&sql)
            .bind(to.to_string())
            .bind(id)
            .bind(from)
            .fetch_optional(&self.pool)
            .await?;
        Ok(reservation)
    }
}
