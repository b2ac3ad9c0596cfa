use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use strum::{Display, EnumString};

use super::get_enum;
use crate::{CountryId, HotelId, RoomId, RoomTypeId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: HotelId,
    pub name: String,
    /// user account of the owner running the hotel
    pub owner_user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoomTypeStatus {
    Visible,
    Hidden,
    DeletedByOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoomStatus {
    Visible,
    Deleted,
}

/// A category of room within one hotel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomType {
    pub id: RoomTypeId,
    pub hotel_id: HotelId,
    pub name: String,
    pub price_per_night: i64,
    pub number_of_guests: i32,
    pub status: RoomTypeStatus,
}

/// One physical, bookable unit of a room type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub room_type_id: RoomTypeId,
    pub code: i32,
    pub status: RoomStatus,
}

impl RoomType {
    pub fn is_bookable(&self) -> bool {
        self.status == RoomTypeStatus::Visible
    }
}

impl FromRow<'_, PgRow> for Hotel {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            owner_user_id: row.try_get("owner_user_id")?,
        })
    }
}

impl FromRow<'_, PgRow> for Country {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            country_code: row.try_get("country_code")?,
        })
    }
}

impl FromRow<'_, PgRow> for RoomType {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            hotel_id: row.try_get("hotel_id")?,
            name: row.try_get("name")?,
            price_per_night: row.try_get("price_per_night")?,
            number_of_guests: row.try_get("number_of_guests")?,
            status: get_enum(row, "status")?,
        })
    }
}

impl FromRow<'_, PgRow> for Room {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            room_type_id: row.try_get("room_type_id")?,
            code: row.try_get("code")?,
            status: get_enum(row, "status")?,
        })
    }
}
