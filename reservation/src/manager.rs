use abi::{
    Actor, BookingConfig, Canceller, Error, GuestId, HotelId, NewReservation, Normalizer, Pager,
    QuoteResponse, Reservation, ReservationDetails, ReservationFilter, ReservationId,
    ReservationStatus, ReserveRequest, StayPolicy, StaySpan,
};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::{
    settle, BookingStore, Inventory, Ledger, PriceLookup, PricingCalculator, ReservationManager,
    Rsvp, UnitOfWork,
};

#[async_trait]
impl<S: BookingStore> Rsvp for ReservationManager<S> {
    #[instrument(skip(self, request), fields(hotel_id = request.hotel_id, user_id = actor.user_id))]
    async fn reserve_hotel_room(
        &self,
        actor: &Actor,
        mut request: ReserveRequest,
    ) -> Result<ReservationId, Error> {
        request.normalize()?;

        let hotel = self.store.hotel(request.hotel_id).await?;
        self.store.country(request.country_id).await?;
        self.store.country(request.country_code_id).await?;

        let guest_id = self
            .store
            .guest_for_user(actor.user_id)
            .await?
            .ok_or(Error::MissingGuestProfile)?;

        let span = self.stay.span(request.check_in, request.check_out)?;

        let mut tx = self.store.begin_serializable().await?;
        let outcome = self.book(&mut tx, guest_id, hotel.id, &request, &span).await;
        if let Err(e) = &outcome {
            debug!(error = %e, "booking rolled back");
        }
        let rsvp = settle(tx, outcome).await?;

        info!(
            reservation_id = rsvp.id,
            total_price = rsvp.total_price,
            nights = span.nights(),
            "reservation confirmed"
        );
        Ok(rsvp.id)
    }

    async fn quote(&self, mut request: ReserveRequest) -> Result<QuoteResponse, Error> {
        request.normalize()?;
        let hotel = self.store.hotel(request.hotel_id).await?;
        let span = self.stay.span(request.check_in, request.check_out)?;
        let nb_nights = span.nights();

        let mut tx = self.store.begin().await?;
        let outcome = self.price(&mut tx, hotel.id, &request, nb_nights).await;
        // nothing was written, so the transaction never commits
        tx.rollback().await?;

        Ok(QuoteResponse {
            total_price: outcome?,
            nb_nights,
        })
    }

    #[instrument(skip(self), fields(user_id = actor.user_id))]
    async fn cancel(
        &self,
        actor: &Actor,
        id: ReservationId,
        canceller: Canceller,
    ) -> Result<Reservation, Error> {
        let to = ReservationStatus::from(canceller);
        let current = self.store.reservation(id).await?.reservation;
        if !self.acts_as(actor, &current, canceller).await? {
            warn!(reservation_id = id, ?canceller, "cancellation refused");
            return Err(Error::PermissionDenied);
        }

        if let Some(rsvp) = self
            .store
            .update_status(id, &ReservationStatus::BLOCKING, to)
            .await?
        {
            info!(reservation_id = id, status = %to, "reservation cancelled");
            return Ok(rsvp);
        }

        // terminal statuses never change, so this read cannot go stale
        let current = self.store.reservation(id).await?.reservation;
        if current.status.is_cancelled() {
            debug!(reservation_id = id, status = %current.status, "reservation already cancelled");
            Ok(current)
        } else {
            Err(Error::InvalidTransition {
                from: current.status,
                to,
            })
        }
    }

    async fn get(&self, actor: &Actor, id: ReservationId) -> Result<ReservationDetails, Error> {
        let details = self.store.reservation(id).await?;
        for role in [Canceller::Guest, Canceller::Owner, Canceller::Admin] {
            if self.acts_as(actor, &details.reservation, role).await? {
                return Ok(details);
            }
        }
        Err(Error::PermissionDenied)
    }

    async fn filter(
        &self,
        actor: &Actor,
        mut filter: ReservationFilter,
    ) -> Result<(Pager, Vec<Reservation>), Error> {
        filter.normalize()?;

        let owned = self.store.hotels_owned_by(actor.user_id).await?;
        if owned.is_empty() {
            return Err(Error::PermissionDenied);
        }
        if let Some(hotel_id) = filter.hotel_id {
            if !owned.contains(&hotel_id) {
                // unknown hotels stay not found
                self.store.hotel(hotel_id).await?;
                return Err(Error::PermissionDenied);
            }
        }
        filter.hotel_ids = Some(owned);

        let mut reservations = self.store.filter(&filter).await?;
        let pager = filter.get_pager(&mut reservations);
        Ok((pager, reservations))
    }
}

impl<S: BookingStore> ReservationManager<S> {
    pub fn new(store: S, pricing: PricingCalculator, stay: StayPolicy) -> Self {
        Self {
            store,
            pricing,
            stay,
        }
    }

    pub fn from_config(store: S, config: &BookingConfig) -> Self {
        Self::new(
            store,
            PricingCalculator::from_config(config),
            config.stay_policy(),
        )
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // whether `actor` holds `role` with respect to `rsvp`
    async fn acts_as(
        &self,
        actor: &Actor,
        rsvp: &Reservation,
        role: Canceller,
    ) -> Result<bool, Error> {
        match role {
            Canceller::Owner => {
                let hotel = self.store.hotel(rsvp.hotel_id).await?;
                Ok(hotel.owner_user_id == actor.user_id)
            }
            Canceller::Guest => {
                let guest_id = self.store.guest_for_user(actor.user_id).await?;
                Ok(guest_id == Some(rsvp.guest_id))
            }
            Canceller::Admin => self.store.is_admin(actor.user_id).await,
        }
    }

    async fn price(
        &self,
        tx: &mut S::Tx,
        hotel_id: HotelId,
        request: &ReserveRequest,
        nb_nights: i64,
    ) -> Result<i64, Error> {
        for item in &request.requested_room_types {
            let room_type = tx.room_type(item.room_type_id).await?;
            if room_type.hotel_id != hotel_id {
                return Err(Error::RoomTypeNotFound(item.room_type_id));
            }
        }
        self.pricing
            .calculate_total_price(tx, &request.requested_room_types, nb_nights)
            .await
    }

    // every write of a booking, inside one transaction
    async fn book(
        &self,
        tx: &mut S::Tx,
        guest_id: GuestId,
        hotel_id: HotelId,
        request: &ReserveRequest,
        span: &StaySpan,
    ) -> Result<Reservation, Error> {
        let total_price = self
            .pricing
            .calculate_total_price(tx, &request.requested_room_types, span.nights())
            .await?;

        let rsvp = tx
            .create_reservation(NewReservation {
                guest_id,
                hotel_id,
                contact: request.contact(),
                span: *span,
                total_price,
                commission: self.pricing.commission(total_price),
            })
            .await?;

        for item in &request.requested_room_types {
            let rooms = tx.find_available_rooms(item.room_type_id, span).await?;
            let requested = item.nb_rooms as usize;
            if rooms.len() < requested {
                warn!(
                    room_type_id = item.room_type_id,
                    requested,
                    available = rooms.len(),
                    "insufficient availability"
                );
                return Err(Error::InsufficientAvailability {
                    room_type_id: item.room_type_id,
                    requested,
                    available: rooms.len(),
                });
            }

            let line = tx
                .attach_room_type(&rsvp, item.room_type_id, item.nb_rooms)
                .await?;
            for room in rooms.iter().take(requested) {
                tx.assign_room(&line, room).await?;
            }
        }

        Ok(rsvp)
    }
}
