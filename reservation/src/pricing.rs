use abi::{BookingConfig, Error, RequestedRoomType};

use crate::PriceLookup;

/// Prices a stay as `price_per_night * nb_rooms * nights`, summed over the
/// requested room types. No taxes or discounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PricingCalculator {
    commission_rate_bp: i64,
}

fn out_of_range() -> Error {
    Error::InvalidRequest("total price is out of range".into())
}

impl PricingCalculator {
    pub fn new(commission_rate_bp: i64) -> Self {
        Self { commission_rate_bp }
    }

    pub fn from_config(config: &BookingConfig) -> Self {
        Self::new(config.commission_rate_bp)
    }

    pub fn line_price(price_per_night: i64, nb_rooms: i32, nb_nights: i64) -> Result<i64, Error> {
        price_per_night
            .checked_mul(nb_rooms as i64)
            .and_then(|p| p.checked_mul(nb_nights))
            .ok_or_else(out_of_range)
    }

    /// Sum of `(price_per_night, nb_rooms)` line items over `nb_nights`.
    pub fn total_price(lines: &[(i64, i32)], nb_nights: i64) -> Result<i64, Error> {
        lines.iter().try_fold(0i64, |total, &(price, nb_rooms)| {
            let line = Self::line_price(price, nb_rooms, nb_nights)?;
            total.checked_add(line).ok_or_else(out_of_range)
        })
    }

    /// Reads current prices through `lookup`, so inside a transaction the
    /// total is computed on the same snapshot the booking commits against.
    pub async fn calculate_total_price<L: PriceLookup>(
        &self,
        lookup: &mut L,
        requested: &[RequestedRoomType],
        nb_nights: i64,
    ) -> Result<i64, Error> {
        let mut lines = Vec::with_capacity(requested.len());
        for item in requested {
            let room_type = lookup.room_type(item.room_type_id).await?;
            lines.push((room_type.price_per_night, item.nb_rooms));
        }
        Self::total_price(&lines, nb_nights)
    }

    /// Platform commission, rounded down.
    pub fn commission(&self, total_price: i64) -> i64 {
        (total_price as i128 * self.commission_rate_bp as i128 / 10_000) as i64
    }
}
