use abi::{CountryId, HotelId, RoomTypeId, StayPolicy, UserId};
use axum::{body::Body, http::Request};
use reservation::{MemoryStore, PricingCalculator, ReservationManager};
use serde_json::json;

/// A hotel with one "Double" room type at 5000 a night, in an in-memory store.
pub struct TestHotel {
    pub store: MemoryStore,
    pub hotel_id: HotelId,
    pub country_id: CountryId,
    pub room_type_id: RoomTypeId,
}

impl TestHotel {
    /// user with a guest profile
    pub const GUEST_USER: UserId = 1;
    /// owns the hotel, has no guest profile
    pub const OWNER_USER: UserId = 2;
    pub const ADMIN_USER: UserId = 3;
    /// no role anywhere
    pub const STRANGER_USER: UserId = 424242;

    pub async fn new(rooms: usize) -> Self {
        let store = MemoryStore::new();
        let hotel_id = store.add_hotel("Azur", Self::OWNER_USER).await;
        let country_id = store.add_country("Algeria", Some("+213")).await;
        let room_type_id = store.add_room_type(hotel_id, "Double", 5000).await;
        store.add_rooms(room_type_id, rooms).await;
        store.add_guest(Self::GUEST_USER).await;
        store.add_admin(Self::ADMIN_USER).await;
        Self {
            store,
            hotel_id,
            country_id,
            room_type_id,
        }
    }

    pub fn manager(&self) -> ReservationManager<MemoryStore> {
        ReservationManager::new(
            self.store.clone(),
            PricingCalculator::new(1000),
            StayPolicy::default(),
        )
    }

    pub fn reservation_body(&self, check_in: &str, check_out: &str, nb_rooms: i32) -> String {
        json!({
            "first_name": "Alice",
            "last_name": "Martin",
            "email": "alice@example.com",
            "country_id": self.country_id,
            "country_code_id": self.country_id,
            "phone": 213555010203i64,
            "hotel_id": self.hotel_id,
            "check_in": check_in,
            "check_out": check_out,
            "requested_room_types": [{ "room_type_id": self.room_type_id, "nb_rooms": nb_rooms }],
        })
        .to_string()
    }

    pub fn post_reservation(
        &self,
        user_id: Option<UserId>,
        check_in: &str,
        check_out: &str,
        nb_rooms: i32,
    ) -> Request<Body> {
        let builder =
            Request::post("/hotels/reservations").header("content-type", "application/json");
        let builder = match user_id {
            Some(id) => builder.header("x-user-id", id.to_string()),
            None => builder,
        };
        builder
            .body(Body::from(self.reservation_body(check_in, check_out, nb_rooms)))
            .unwrap()
    }

    pub fn request(&self, method: &str, uri: &str, user_id: UserId) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", user_id.to_string())
            .body(Body::empty())
            .unwrap()
    }
}
