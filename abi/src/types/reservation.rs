use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};

use super::get_enum;
use crate::{
    CountryId, GuestId, HotelId, ReservationId, ReservationStatus, ReservedRoomTypeId, RoomId,
    RoomTypeId, StaySpan, UserId,
};

/// Columns selected whenever a full reservation row is read.
pub const RESERVATION_COLUMNS: &str = "id, guest_id, hotel_id, first_name, last_name, email, \
    country_id, country_code_id, phone, check_in, check_out, total_price, commission, \
    status::text AS status, created_at";

/// The user on whose behalf a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
}

/// Contact details captured at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub country_id: CountryId,
    pub country_code_id: CountryId,
    pub phone: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub guest_id: GuestId,
    pub hotel_id: HotelId,
    #[serde(flatten)]
    pub contact: ContactInfo,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub total_price: i64,
    pub commission: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

/// A reservation about to be inserted; always starts out `Confirmed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub guest_id: GuestId,
    pub hotel_id: HotelId,
    pub contact: ContactInfo,
    pub span: StaySpan,
    pub total_price: i64,
    pub commission: i64,
}

/// Line item: how many rooms of one type a reservation holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedRoomType {
    pub id: ReservedRoomTypeId,
    pub reservation_id: ReservationId,
    pub room_type_id: RoomTypeId,
    pub nb_rooms: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAssignment {
    pub id: i64,
    pub reserved_room_type_id: ReservedRoomTypeId,
    pub room_id: RoomId,
}

/// A line item together with the rooms assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedRooms {
    pub room_type_id: RoomTypeId,
    pub nb_rooms: i32,
    pub room_ids: Vec<RoomId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationDetails {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub rooms: Vec<BookedRooms>,
}

impl Reservation {
    pub fn span(&self) -> StaySpan {
        StaySpan {
            check_in: self.check_in,
            check_out: self.check_out,
        }
    }

    /// Whether this reservation keeps its rooms away from `span`.
    pub fn blocks(&self, span: &StaySpan) -> bool {
        self.status.is_blocking() && span.overlaps(&self.check_in, &self.check_out)
    }
}

impl FromRow<'_, PgRow> for Reservation {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            guest_id: row.try_get("guest_id")?,
            hotel_id: row.try_get("hotel_id")?,
            contact: ContactInfo {
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
                email: row.try_get("email")?,
                country_id: row.try_get("country_id")?,
                country_code_id: row.try_get("country_code_id")?,
                phone: row.try_get("phone")?,
            },
            check_in: row.try_get("check_in")?,
            check_out: row.try_get("check_out")?,
            total_price: row.try_get("total_price")?,
            commission: row.try_get("commission")?,
            status: get_enum(row, "status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromRow<'_, PgRow> for ReservedRoomType {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            reservation_id: row.try_get("reservation_id")?,
            room_type_id: row.try_get("room_type_id")?,
            nb_rooms: row.try_get("nb_rooms")?,
        })
    }
}

impl FromRow<'_, PgRow> for RoomAssignment {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            reserved_room_type_id: row.try_get("reserved_room_type_id")?,
            room_id: row.try_get("room_id")?,
        })
    }
}

impl FromRow<'_, PgRow> for BookedRooms {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            room_type_id: row.try_get("room_type_id")?,
            nb_rooms: row.try_get("nb_rooms")?,
            room_ids: row.try_get("room_ids")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StayPolicy;
    use chrono::NaiveDate;

    fn reservation(status: ReservationStatus) -> Reservation {
        let span = StayPolicy::default()
            .span(
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            )
            .unwrap();
        Reservation {
            id: 1,
            guest_id: 1,
            hotel_id: 1,
            contact: ContactInfo {
                first_name: "Alice".into(),
                last_name: "Martin".into(),
                email: "alice@example.com".into(),
                country_id: 1,
                country_code_id: 1,
                phone: 213555010203,
            },
            check_in: span.check_in,
            check_out: span.check_out,
            total_price: 10000,
            commission: 0,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn cancelled_reservation_should_not_block() {
        let span = reservation(ReservationStatus::Confirmed).span();
        assert!(reservation(ReservationStatus::Confirmed).blocks(&span));
        assert!(reservation(ReservationStatus::Active).blocks(&span));
        assert!(!reservation(ReservationStatus::CancelledByOwner).blocks(&span));
        assert!(!reservation(ReservationStatus::Completed).blocks(&span));
    }

    #[test]
    fn reservation_should_serialize_flat_contact() {
        let value = serde_json::to_value(reservation(ReservationStatus::Confirmed)).unwrap();
        assert_eq!(value["email"], "alice@example.com");
        assert_eq!(value["status"], "confirmed");
    }
}
