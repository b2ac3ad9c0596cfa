use std::{sync::Arc, time::Duration};

use abi::{
    intervals_overlap, Actor, Canceller, Error, HotelId, RequestedRoomType, ReservationFilter,
    ReservationFilterBuilder, ReservationStatus, ReserveRequest, RoomStatus, RoomTypeId,
    RoomTypeStatus, StayPolicy,
};
use chrono::{NaiveDate, TimeZone, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use reservation::{
    MemoryStore, PricingCalculator, ReservationManager, RetryPolicy, Rsvp, Snapshot,
    StatusSweeper, SweepReport,
};

struct Hotel {
    store: MemoryStore,
    manager: ReservationManager<MemoryStore>,
    hotel_id: HotelId,
    country_id: i64,
    room_type_id: RoomTypeId,
}

const ALICE: Actor = Actor { user_id: 1 };
const BOB: Actor = Actor { user_id: 2 };
const OWNER: Actor = Actor { user_id: 3 };
const ADMIN: Actor = Actor { user_id: 4 };

/// One room of type "Double" at 5000 a night, guests for user 1 and 2,
/// owned by user 3, user 4 is an admin.
async fn hotel() -> Hotel {
    let store = MemoryStore::new();
    let hotel_id = store.add_hotel("Azur", OWNER.user_id).await;
    let country_id = store.add_country("Algeria", Some("+213")).await;
    let room_type_id = store.add_room_type(hotel_id, "Double", 5000).await;
    store.add_rooms(room_type_id, 1).await;
    store.add_guest(ALICE.user_id).await;
    store.add_guest(BOB.user_id).await;
    store.add_admin(ADMIN.user_id).await;
    let manager = ReservationManager::new(
        store.clone(),
        PricingCalculator::default(),
        StayPolicy::default(),
    );
    Hotel {
        store,
        manager,
        hotel_id,
        country_id,
        room_type_id,
    }
}

fn june(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

fn request(
    h: &Hotel,
    check_in: u32,
    check_out: u32,
    lines: &[(RoomTypeId, i32)],
) -> ReserveRequest {
    ReserveRequest {
        first_name: "Alice".into(),
        last_name: "Martin".into(),
        email: "alice@example.com".into(),
        country_id: h.country_id,
        country_code_id: h.country_id,
        phone: 213555010203,
        hotel_id: h.hotel_id,
        check_in: june(check_in),
        check_out: june(check_out),
        requested_room_types: lines
            .iter()
            .map(|&(room_type_id, nb_rooms)| RequestedRoomType {
                room_type_id,
                nb_rooms,
            })
            .collect(),
    }
}

fn assert_no_double_booking(snapshot: &Snapshot) {
    let reservation_of = |line_id: i64| {
        let line = snapshot
            .reserved_room_types
            .iter()
            .find(|l| l.id == line_id)
            .unwrap();
        snapshot
            .reservations
            .iter()
            .find(|r| r.id == line.reservation_id)
            .unwrap()
    };
    for (i, a) in snapshot.assignments.iter().enumerate() {
        for b in &snapshot.assignments[i + 1..] {
            if a.room_id != b.room_id {
                continue;
            }
            let (ra, rb) = (
                reservation_of(a.reserved_room_type_id),
                reservation_of(b.reserved_room_type_id),
            );
            if ra.status.is_blocking() && rb.status.is_blocking() {
                assert!(
                    !intervals_overlap(&ra.check_in, &ra.check_out, &rb.check_in, &rb.check_out),
                    "room {} double booked by reservations {} and {}",
                    a.room_id,
                    ra.id,
                    rb.id
                );
            }
        }
    }
}

#[tokio::test]
async fn overlapping_stay_should_be_refused() {
    let h = hotel().await;
    let id = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 1)]))
        .await
        .unwrap();
    assert_eq!(h.manager.get(&ADMIN, id).await.unwrap().reservation.total_price, 10000);

    let err = h
        .manager
        .reserve_hotel_room(&BOB, request(&h, 2, 4, &[(h.room_type_id, 1)]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::InsufficientAvailability {
            room_type_id: h.room_type_id,
            requested: 1,
            available: 0
        }
    );
}

#[tokio::test]
async fn adjacent_stay_should_be_accepted() {
    let h = hotel().await;
    h.manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 1)]))
        .await
        .unwrap();
    h.manager
        .reserve_hotel_room(&BOB, request(&h, 3, 5, &[(h.room_type_id, 1)]))
        .await
        .unwrap();
    assert_no_double_booking(&h.store.snapshot().await);
}

#[tokio::test]
async fn cancelled_reservation_should_free_its_room() {
    let h = hotel().await;
    let first = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 1)]))
        .await
        .unwrap();
    h.manager.cancel(&OWNER, first, Canceller::Owner).await.unwrap();

    let second = h
        .manager
        .reserve_hotel_room(&BOB, request(&h, 1, 3, &[(h.room_type_id, 1)]))
        .await
        .unwrap();

    let first = h.manager.get(&ADMIN, first).await.unwrap();
    let second = h.manager.get(&ADMIN, second).await.unwrap();
    assert_eq!(first.reservation.status, ReservationStatus::CancelledByOwner);
    // assignment rows are kept, the room is shared only with a cancelled stay
    assert_eq!(first.rooms[0].room_ids, second.rooms[0].room_ids);
    assert_no_double_booking(&h.store.snapshot().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_last_room_should_commit_once() {
    let h = Arc::new(hotel().await);
    let tasks: Vec<_> = [ALICE, BOB]
        .into_iter()
        .map(|actor| {
            let h = h.clone();
            tokio::spawn(async move {
                let req = request(&h, 1, 3, &[(h.room_type_id, 1)]);
                h.manager.reserve_hotel_room(&actor, req).await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        err,
        Error::InsufficientAvailability { .. } | Error::TransactionConflict
    ));
    assert_eq!(h.store.snapshot().await.reservations.len(), 1);
}

#[tokio::test]
async fn failed_booking_should_leave_no_rows() {
    let h = hotel().await;
    let suite = h.store.add_room_type(h.hotel_id, "Suite", 12000).await;
    h.store.add_rooms(suite, 1).await;

    // first line fits, second does not: nothing of either may persist
    let err = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 1), (suite, 2)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientAvailability { room_type_id, .. } if room_type_id == suite));
    assert_eq!(h.store.snapshot().await, Snapshot::default());

    // a room type of another hotel is an integrity error, also rolled back
    let other_hotel = h.store.add_hotel("Sahara", 5).await;
    let foreign = h.store.add_room_type(other_hotel, "Tent", 2000).await;
    h.store.add_rooms(foreign, 1).await;
    let err = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 1), (foreign, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IntegrityViolation(_)));
    assert_eq!(h.store.snapshot().await, Snapshot::default());
}

#[tokio::test]
async fn hidden_inventory_should_not_be_bookable() {
    let h = hotel().await;
    let suite = h.store.add_room_type(h.hotel_id, "Suite", 12000).await;
    let rooms = h.store.add_rooms(suite, 2).await;
    h.store.set_room_status(rooms[0], RoomStatus::Deleted).await;

    let err = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(suite, 2)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientAvailability { available: 1, .. }));

    h.store
        .set_room_type_status(suite, RoomTypeStatus::DeletedByOwner)
        .await;
    let err = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(suite, 1)]))
        .await
        .unwrap_err();
    assert_eq!(err, Error::RoomTypeNotFound(suite));
}

#[tokio::test]
async fn invalid_request_should_fail_before_any_lookup() {
    let h = hotel().await;
    let err = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 3, 3, &[(h.room_type_id, 1)]))
        .await
        .unwrap_err();
    assert_eq!(err, Error::InvalidTime);

    let err = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}

#[tokio::test]
async fn cancelling_twice_should_be_a_no_op() {
    let h = hotel().await;
    let id = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 1)]))
        .await
        .unwrap();

    let first = h.manager.cancel(&ALICE, id, Canceller::Guest).await.unwrap();
    let again = h.manager.cancel(&ADMIN, id, Canceller::Admin).await.unwrap();
    assert_eq!(first.status, ReservationStatus::CancelledByGuest);
    assert_eq!(again, first);
}

#[tokio::test]
async fn sweeper_should_advance_statuses_with_the_clock() {
    let h = hotel().await;
    let suite = h.store.add_room_type(h.hotel_id, "Suite", 12000).await;
    h.store.add_rooms(suite, 1).await;

    let stay = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 1)]))
        .await
        .unwrap();
    let short = h
        .manager
        .reserve_hotel_room(&BOB, request(&h, 1, 2, &[(suite, 1)]))
        .await
        .unwrap();
    let cancelled = h
        .manager
        .reserve_hotel_room(&BOB, request(&h, 10, 12, &[(suite, 1)]))
        .await
        .unwrap();
    h.manager.cancel(&OWNER, cancelled, Canceller::Owner).await.unwrap();

    let sweeper = StatusSweeper::new(h.store.clone(), Duration::from_secs(3600));
    let status = |id| {
        let manager = &h.manager;
        async move { manager.get(&ADMIN, id).await.unwrap().reservation.status }
    };

    // Jun 2 at noon: both started, the short stay is over
    let report = sweeper
        .sweep(Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap())
        .await;
    assert_eq!(report.activated, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(status(stay).await, ReservationStatus::Active);
    assert_eq!(status(short).await, ReservationStatus::Completed);

    // a completed stay stops blocking its room
    let report = sweeper
        .sweep(Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap())
        .await;
    assert_eq!(report.activated, 0);
    assert_eq!(report.completed, 1);
    assert_eq!(status(stay).await, ReservationStatus::Completed);
    assert_eq!(status(cancelled).await, ReservationStatus::CancelledByOwner);

    // terminal statuses never move again
    let report = sweeper
        .sweep(Utc.with_ymd_and_hms(2024, 7, 30, 0, 0, 0).unwrap())
        .await;
    assert_eq!(report, SweepReport::default());
    assert!(matches!(
        h.manager.cancel(&ADMIN, stay, Canceller::Admin).await,
        Err(Error::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn sweeper_run_should_stop_on_shutdown() {
    let h = hotel().await;
    let id = h
        .manager
        .reserve_hotel_room(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 1)]))
        .await
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let sweeper = StatusSweeper::new(h.store.clone(), Duration::from_millis(10));
    let handle = tokio::spawn(sweeper.run(async move {
        rx.await.ok();
    }));

    // the first tick fires at once and the stay is long past
    for _ in 0..100 {
        let details = h.manager.get(&ADMIN, id).await.unwrap();
        if details.reservation.status == ReservationStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        h.manager.get(&ADMIN, id).await.unwrap().reservation.status,
        ReservationStatus::Completed
    );

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn filter_should_page_by_id() {
    let h = hotel().await;
    let mut ids = Vec::new();
    for day in 1..=12 {
        let id = h
            .manager
            .reserve_hotel_room(&ALICE, request(&h, day, day + 1, &[(h.room_type_id, 1)]))
            .await
            .unwrap();
        ids.push(id);
    }

    let filter = ReservationFilterBuilder::default()
        .hotel_id(h.hotel_id)
        .status(ReservationStatus::Confirmed)
        .build()
        .unwrap();
    let (pager, page) = h.manager.filter(&OWNER, filter.clone()).await.unwrap();
    assert_eq!(page.len(), 10);
    assert_eq!(page[0].id, ids[0]);
    assert_eq!(pager.next, Some(ids[9]));

    let (pager, page) = h
        .manager
        .filter(&OWNER, filter.next_page(&pager).unwrap())
        .await
        .unwrap();
    assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), ids[10..]);
    assert_eq!(pager.next, None);

    let newest_first = ReservationFilter {
        desc: true,
        ..filter.clone()
    };
    let (_, page) = h.manager.filter(&OWNER, newest_first).await.unwrap();
    assert_eq!(page[0].id, ids[11]);

    let err = h
        .manager
        .filter(
            &OWNER,
            ReservationFilter {
                page_size: 1000,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));

    // another user sees none of it
    assert_eq!(
        h.manager.filter(&ALICE, filter).await.unwrap_err(),
        Error::PermissionDenied
    );
}

#[tokio::test]
async fn conflicts_should_be_retried_with_a_fresh_booking() {
    let h = hotel().await;
    let policy = RetryPolicy {
        initial_delay: Duration::from_millis(1),
        ..RetryPolicy::default()
    };

    h.store.inject_conflicts(2);
    let id = h
        .manager
        .reserve_with_retry(&ALICE, request(&h, 1, 3, &[(h.room_type_id, 1)]), &policy)
        .await
        .unwrap();
    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.reservations.len(), 1);
    assert_eq!(snapshot.reservations[0].id, id);

    h.store.inject_conflicts(10);
    let err = h
        .manager
        .reserve_with_retry(&BOB, request(&h, 5, 6, &[(h.room_type_id, 1)]), &policy)
        .await
        .unwrap_err();
    assert_eq!(err, Error::TransactionConflict);
    assert_eq!(h.store.snapshot().await.reservations.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_concurrent_bookings_should_never_double_book() {
    let h = Arc::new(hotel().await);
    let suite = h.store.add_room_type(h.hotel_id, "Suite", 12000).await;
    h.store.add_rooms(h.room_type_id, 2).await;
    h.store.add_rooms(suite, 2).await;

    let mut rng = StdRng::seed_from_u64(42);
    let mut tasks = Vec::new();
    for i in 0..60 {
        let check_in: u32 = rng.gen_range(1..20);
        let check_out = check_in + rng.gen_range(1..5);
        let mut lines: Vec<(RoomTypeId, i32)> = vec![(h.room_type_id, rng.gen_range(1..3))];
        if rng.gen_bool(0.3) {
            lines.push((suite, 1));
        }
        let cancel_after = rng.gen_bool(0.2);
        let actor = if i % 2 == 0 { ALICE } else { BOB };
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            let req = request(&h, check_in, check_out, &lines);
            let result = h.manager.reserve_hotel_room(&actor, req).await;
            if let (Ok(id), true) = (&result, cancel_after) {
                h.manager.cancel(&actor, *id, Canceller::Guest).await.unwrap();
            }
            result
        }));
    }

    let mut booked = 0;
    for task in futures::future::join_all(tasks).await {
        match task.unwrap() {
            Ok(_) => booked += 1,
            Err(Error::InsufficientAvailability { .. }) | Err(Error::TransactionConflict) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(booked > 0);

    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.reservations.len(), booked);
    assert_no_double_booking(&snapshot);
    // every committed line got exactly its rooms
    for line in &snapshot.reserved_room_types {
        let assigned = snapshot
            .assignments
            .iter()
            .filter(|a| a.reserved_room_type_id == line.id)
            .count();
        assert_eq!(assigned, line.nb_rooms as usize);
    }
}
