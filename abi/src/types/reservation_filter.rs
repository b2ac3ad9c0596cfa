use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    pager::{PageInfo, Pager},
    Error, GuestId, HotelId, Normalizer, Reservation, ReservationId, ReservationStatus, ToSql,
    Validator, RESERVATION_COLUMNS,
};

const DEFAULT_PAGE_SIZE: i64 = 10;

/// Reservation listing criteria, ordered by reservation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(build_fn(name = "private_build"), setter(into), default)]
#[serde(default)]
pub struct ReservationFilter {
    #[builder(setter(strip_option))]
    pub hotel_id: Option<HotelId>,
    #[builder(setter(strip_option))]
    pub guest_id: Option<GuestId>,
    #[builder(setter(strip_option))]
    pub status: Option<ReservationStatus>,
    #[builder(setter(strip_option))]
    pub cursor: Option<ReservationId>,
    pub page_size: i64,
    pub desc: bool,
    /// Restricts the listing to these hotels. Never read from a query string.
    #[builder(setter(strip_option))]
    #[serde(skip)]
    pub hotel_ids: Option<Vec<HotelId>>,
}

impl Default for ReservationFilter {
    fn default() -> Self {
        Self {
            hotel_id: None,
            guest_id: None,
            status: None,
            cursor: None,
            page_size: DEFAULT_PAGE_SIZE,
            desc: false,
            hotel_ids: None,
        }
    }
}

impl ReservationFilterBuilder {
    pub fn build(&self) -> Result<ReservationFilter, Error> {
        let mut filter = self
            .private_build()
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        filter.normalize()?;
        Ok(filter)
    }
}

impl Validator for ReservationFilter {
    fn validate(&self) -> Result<(), Error> {
        if self.page_size < 10 || self.page_size > 100 {
            return Err(Error::InvalidRequest(format!(
                "page size must be between 10 and 100, got {}",
                self.page_size
            )));
        }
        if let Some(cursor) = self.cursor {
            if cursor <= 0 {
                return Err(Error::InvalidRequest(format!("invalid cursor {}", cursor)));
            }
        }
        Ok(())
    }
}

impl Normalizer for ReservationFilter {
    fn do_normalize(&mut self) {
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
    }
}

impl ReservationFilter {
    pub fn get_pager(&self, data: &mut Vec<Reservation>) -> Pager {
        self.page_info().get_pager(data)
    }

    /// Same predicate as the generated SQL, for stores that filter in memory.
    pub fn matches(&self, rsvp: &Reservation) -> bool {
        let after_cursor = match self.cursor {
            Some(cursor) if self.desc => rsvp.id < cursor,
            Some(cursor) => rsvp.id > cursor,
            None => true,
        };
        after_cursor
            && self.hotel_id.map_or(true, |id| rsvp.hotel_id == id)
            && self
                .hotel_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&rsvp.hotel_id))
            && self.guest_id.map_or(true, |id| rsvp.guest_id == id)
            && self.status.map_or(true, |status| rsvp.status == status)
    }

    pub fn next_page(&self, pager: &Pager) -> Option<Self> {
        pager.next.map(|cursor| Self {
            cursor: Some(cursor),
            ..self.clone()
        })
    }

    fn page_info(&self) -> PageInfo {
        PageInfo {
            cursor: self.cursor,
            page_size: self.page_size,
            desc: self.desc,
        }
    }
}

impl ToSql for ReservationFilter {
    fn to_sql(&self) -> String {
        let limit = self.page_size + 1;

        let mut conditions = Vec::new();
        if let Some(cursor) = self.cursor {
            if self.desc {
                conditions.push(format!("id < {}", cursor));
            } else {
                conditions.push(format!("id > {}", cursor));
            }
        }
        if let Some(hotel_id) = self.hotel_id {
            conditions.push(format!("hotel_id = {}", hotel_id));
        }
        if let Some(hotel_ids) = &self.hotel_ids {
            if hotel_ids.is_empty() {
                conditions.push("FALSE".to_string());
            } else {
                let ids: Vec<String> = hotel_ids.iter().map(ToString::to_string).collect();
                conditions.push(format!("hotel_id IN ({})", ids.join(", ")));
            }
        }
        if let Some(guest_id) = self.guest_id {
            conditions.push(format!("guest_id = {}", guest_id));
        }
        if let Some(status) = self.status {
            conditions.push(format!("status = '{}'::rsvp.reservation_status", status));
        }
        let conditions = if conditions.is_empty() {
            "TRUE".to_string()
        } else {
            conditions.join(" AND ")
        };

        let direction = if self.desc { "DESC" } else { "ASC" };

        format!(
            "SELECT {} FROM rsvp.reservations WHERE {} ORDER BY id {} LIMIT {}",
            RESERVATION_COLUMNS, conditions, direction, limit
        )
    }
}
