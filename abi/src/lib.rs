mod config;
mod error;
mod pager;
mod types;

pub use config::*;
pub use error::Error;
pub use pager::*;
pub use types::*;

pub type HotelId = i64;
pub type CountryId = i64;
pub type GuestId = i64;
pub type UserId = i64;
pub type RoomTypeId = i64;
pub type RoomId = i64;
pub type ReservationId = i64;
pub type ReservedRoomTypeId = i64;

pub trait Validator {
    fn validate(&self) -> Result<(), Error>;
}

/// Normalize a value in place, then make sure what is left is valid.
pub trait Normalizer: Validator {
    fn normalize(&mut self) -> Result<(), Error> {
        self.do_normalize();
        self.validate()
    }

    fn do_normalize(&mut self);
}

pub trait ToSql {
    fn to_sql(&self) -> String;
}
