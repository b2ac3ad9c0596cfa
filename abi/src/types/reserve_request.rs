use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    ContactInfo, CountryId, Error, HotelId, Normalizer, ReservationId, RoomTypeId, Validator,
};

/// A guest's request to book rooms of one hotel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, garde::Validate)]
pub struct ReserveRequest {
    #[garde(length(min = 1, max = 255))]
    pub first_name: String,
    #[garde(length(min = 1, max = 255))]
    pub last_name: String,
    #[garde(email)]
    pub email: String,
    #[garde(skip)]
    pub country_id: CountryId,
    #[garde(skip)]
    pub country_code_id: CountryId,
    /// 7 to 15 digits
    #[garde(range(min = 1_000_000, max = 999_999_999_999_999))]
    pub phone: i64,
    #[garde(skip)]
    pub hotel_id: HotelId,
    #[garde(skip)]
    pub check_in: NaiveDate,
    #[garde(skip)]
    pub check_out: NaiveDate,
    #[garde(length(min = 1), dive)]
    pub requested_room_types: Vec<RequestedRoomType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, garde::Validate)]
pub struct RequestedRoomType {
    #[garde(skip)]
    pub room_type_id: RoomTypeId,
    #[garde(range(min = 1))]
    pub nb_rooms: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveResponse {
    pub detail: String,
    pub reservation_id: ReservationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub total_price: i64,
    pub nb_nights: i64,
}

impl ReserveRequest {
    pub fn contact(&self) -> ContactInfo {
        ContactInfo {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            country_id: self.country_id,
            country_code_id: self.country_code_id,
            phone: self.phone,
        }
    }
}

impl Validator for ReserveRequest {
    fn validate(&self) -> Result<(), Error> {
        if self.check_out <= self.check_in {
            return Err(Error::InvalidTime);
        }
        garde::Validate::validate(self)?;

        let mut seen = HashSet::new();
        for item in &self.requested_room_types {
            if !seen.insert(item.room_type_id) {
                return Err(Error::InvalidRequest(format!(
                    "room type {} is requested more than once",
                    item.room_type_id
                )));
            }
        }
        Ok(())
    }
}

impl Normalizer for ReserveRequest {
    fn do_normalize(&mut self) {
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self.email = self.email.trim().to_lowercase();
    }
}
