use super::*;
use crate::clock::FixedClock;
use crate::model::*;
use crate::registry::{InMemoryDirectory, InMemoryRegistry};
use crate::store::WalStore;

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use ulid::Ulid;

const M: Secs = SECS_PER_MINUTE;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("tablebook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn tomorrow() -> NaiveDate {
    today().succ_opt().unwrap()
}

fn table(number: u32, capacity: u32, hourly_rate: Cents) -> Table {
    Table {
        id: Ulid::new(),
        number,
        capacity,
        window_seat: false,
        accessible: false,
        hourly_rate,
        status: TableStatus::Available,
    }
}

struct Harness {
    engine: Arc<Engine>,
    registry: Arc<InMemoryRegistry>,
    customer: CustomerId,
    /// T1: capacity 4, $15/hr.
    t1: Table,
}

impl Harness {
    fn open(name: &str) -> Self {
        Self::open_at(&test_wal_path(name))
    }

    fn open_at(path: &std::path::Path) -> Self {
        Self::build(path, Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap())
    }

    fn open_with_clock(name: &str, now: chrono::DateTime<Utc>) -> Self {
        Self::build(&test_wal_path(name), now)
    }

    fn build(path: &std::path::Path, now: chrono::DateTime<Utc>) -> Self {
        let config = EngineConfig::default();
        let registry = Arc::new(InMemoryRegistry::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let customer = Ulid::new();
        directory.insert_customer(customer);
        let t1 = table(1, 4, 1500);
        registry.insert_table(t1.clone());

        let store = Arc::new(WalStore::open(path, config.buffer).unwrap());
        let clock = Arc::new(FixedClock::new(now));
        let engine = Engine::new(registry.clone(), directory, store, clock, config);
        Self {
            engine: Arc::new(engine),
            registry,
            customer,
            t1,
        }
    }

    fn booking(&self, start: NaiveTime, end: NaiveTime, party_size: u32) -> NewReservation {
        NewReservation {
            customer_id: self.customer,
            table_id: self.t1.id,
            date: tomorrow(),
            start,
            end,
            party_size,
            note: None,
        }
    }
}

// ── Lifecycle scenarios ──────────────────────────────────

#[tokio::test]
async fn create_confirms_booking() {
    let h = Harness::open("create_confirms.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    assert_eq!(r.status, ReservationStatus::Confirmed);
    assert_eq!(r.table_id, h.t1.id);
    assert_eq!(r.created_at, Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap());
    assert_eq!(h.engine.get(r.id).await.unwrap(), r);
}

#[tokio::test]
async fn overlapping_create_conflicts() {
    let h = Harness::open("overlap_conflicts.wal");
    let first = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let err = h
        .engine
        .create(h.booking(at(15, 0), at(17, 0), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(id) if id == first.id));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn create_inside_buffer_conflicts() {
    let h = Harness::open("inside_buffer.wal");
    h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let err = h
        .engine
        .create(h.booking(at(16, 5), at(18, 0), 2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn create_at_buffer_boundary_succeeds() {
    let h = Harness::open("buffer_boundary.wal");
    h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let r = h.engine.create(h.booking(at(16, 15), at(18, 0), 2)).await.unwrap();
    assert_eq!(r.status, ReservationStatus::Confirmed);
}

#[tokio::test]
async fn one_second_inside_buffer_conflicts() {
    let h = Harness::open("one_second.wal");
    h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let start = NaiveTime::from_hms_opt(16, 14, 59).unwrap();
    let err = h.engine.create(h.booking(start, at(18, 0), 2)).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn buffer_applies_before_start_too() {
    let h = Harness::open("buffer_before.wal");
    h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    assert!(h.engine.create(h.booking(at(12, 0), at(13, 50), 2)).await.is_err());
    h.engine.create(h.booking(at(12, 0), at(13, 45), 2)).await.unwrap();
}

#[tokio::test]
async fn check_in_twice_is_business_rule() {
    let h = Harness::open("check_in_twice.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let checked = h.engine.check_in(r.id).await.unwrap();
    assert_eq!(checked.status, ReservationStatus::CheckedIn);

    let err = h.engine.check_in(r.id).await.unwrap_err();
    assert!(matches!(err, EngineError::BusinessRule(BusinessRule::AlreadyCheckedIn)));
    assert_eq!(err.to_string(), "already checked in");
}

#[tokio::test]
async fn check_in_cancelled_rejected() {
    let h = Harness::open("check_in_cancelled.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    h.engine.cancel(r.id).await.unwrap();
    let err = h.engine.check_in(r.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    assert_eq!(err.to_string(), "cannot check in a cancelled reservation");
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let h = Harness::open("cancel_idempotent.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let once = h.engine.cancel(r.id).await.unwrap();
    let twice = h.engine.cancel(r.id).await.unwrap();
    assert_eq!(once, twice);
    assert_eq!(twice.status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn cancel_frees_the_slot() {
    let h = Harness::open("cancel_frees.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    h.engine.cancel(r.id).await.unwrap();
    h.engine.create(h.booking(at(14, 0), at(16, 0), 2)).await.unwrap();
}

#[tokio::test]
async fn checked_in_can_be_cancelled() {
    let h = Harness::open("checked_in_cancel.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    h.engine.check_in(r.id).await.unwrap();
    let c = h.engine.cancel(r.id).await.unwrap();
    assert_eq!(c.status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn no_show_rules() {
    let h = Harness::open("no_show.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let n = h.engine.mark_no_show(r.id).await.unwrap();
    assert_eq!(n.status, ReservationStatus::NoShow);
    h.engine.mark_no_show(r.id).await.unwrap();

    assert!(matches!(
        h.engine.cancel(r.id).await,
        Err(EngineError::BusinessRule(BusinessRule::CancelNoShow))
    ));
    assert!(matches!(
        h.engine.check_in(r.id).await,
        Err(EngineError::BusinessRule(BusinessRule::CheckInNoShow))
    ));

    let seated = h.engine.create(h.booking(at(18, 0), at(19, 0), 2)).await.unwrap();
    h.engine.check_in(seated.id).await.unwrap();
    assert!(matches!(
        h.engine.mark_no_show(seated.id).await,
        Err(EngineError::BusinessRule(BusinessRule::NoShowCheckedIn))
    ));
}

#[tokio::test]
async fn status_change_on_unknown_id_is_not_found() {
    let h = Harness::open("status_unknown.wal");
    let err = h.engine.cancel(Ulid::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: Entity::Reservation, .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ── Create validation ────────────────────────────────────

#[tokio::test]
async fn create_unknown_customer_or_table() {
    let h = Harness::open("create_unknown.wal");
    let mut req = h.booking(at(14, 0), at(16, 0), 2);
    req.customer_id = Ulid::new();
    let err = h.engine.create(req).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: Entity::Customer, .. }));

    let mut req = h.booking(at(14, 0), at(16, 0), 2);
    req.table_id = Ulid::new();
    let err = h.engine.create(req).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: Entity::Table, .. }));
}

#[tokio::test]
async fn create_names_the_failed_rule() {
    let h = Harness::open("create_rules.wal");

    let mut past = h.booking(at(14, 0), at(16, 0), 2);
    past.date = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
    assert!(matches!(
        h.engine.create(past).await,
        Err(EngineError::Validation(ValidationError::PastDate { .. }))
    ));

    assert!(matches!(
        h.engine.create(h.booking(at(16, 0), at(14, 0), 2)).await,
        Err(EngineError::Validation(ValidationError::InvalidTimeRange { .. }))
    ));
    assert!(matches!(
        h.engine.create(h.booking(at(14, 0), at(14, 0), 2)).await,
        Err(EngineError::Validation(ValidationError::InvalidTimeRange { .. }))
    ));
    assert!(matches!(
        h.engine.create(h.booking(at(14, 0), at(16, 0), 0)).await,
        Err(EngineError::Validation(ValidationError::PartySizeOutOfBounds(0)))
    ));
    assert!(matches!(
        h.engine.create(h.booking(at(14, 0), at(16, 0), 5)).await,
        Err(EngineError::Validation(ValidationError::ExceedsCapacity {
            party_size: 5,
            capacity: 4
        }))
    ));
    assert!(matches!(
        h.engine.create(h.booking(at(9, 0), at(11, 0), 2)).await,
        Err(EngineError::Validation(ValidationError::OutsideOperatingHours { .. }))
    ));
    assert!(matches!(
        h.engine.create(h.booking(at(21, 0), at(22, 30), 2)).await,
        Err(EngineError::Validation(ValidationError::OutsideOperatingHours { .. }))
    ));

    let mut noisy = h.booking(at(14, 0), at(16, 0), 2);
    noisy.note = Some("x".repeat(crate::limits::MAX_NOTE_LEN + 1));
    assert!(matches!(
        h.engine.create(noisy).await,
        Err(EngineError::Validation(ValidationError::NoteTooLong(_)))
    ));
}

#[tokio::test]
async fn whole_operating_day_is_bookable() {
    let h = Harness::open("whole_day.wal");
    h.engine.create(h.booking(at(10, 0), at(22, 0), 2)).await.unwrap();
}

#[tokio::test]
async fn same_day_past_time_allowed() {
    let evening = Utc.with_ymd_and_hms(2026, 10, 16, 20, 0, 0).unwrap();
    let h = Harness::open_with_clock("same_day_past.wal", evening);
    let mut req = h.booking(at(12, 0), at(13, 0), 2);
    req.date = today();
    let r = h.engine.create(req).await.unwrap();
    assert_eq!(r.date, today());
}

#[tokio::test]
async fn maintenance_table_cannot_be_booked() {
    let h = Harness::open("maintenance.wal");
    h.registry.set_status(h.t1.id, TableStatus::Maintenance);
    let err = h
        .engine
        .create(h.booking(at(14, 0), at(16, 0), 2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BusinessRule(BusinessRule::TableUnavailable)));
}

// ── Update ───────────────────────────────────────────────

#[tokio::test]
async fn update_does_not_conflict_with_itself() {
    let h = Harness::open("update_self.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let patch = ReservationPatch {
        start: Some(at(14, 30)),
        end: Some(at(16, 30)),
        ..Default::default()
    };
    let u = h.engine.update(r.id, patch).await.unwrap();
    assert_eq!((u.start, u.end), (at(14, 30), at(16, 30)));
    assert_eq!(u.id, r.id);
    assert_eq!(u.created_at, r.created_at);
    assert_eq!(u.status, ReservationStatus::Confirmed);
}

#[tokio::test]
async fn update_keeps_unspecified_fields() {
    let h = Harness::open("update_merge.wal");
    let mut req = h.booking(at(14, 0), at(16, 0), 4);
    req.note = Some("birthday".into());
    let r = h.engine.create(req).await.unwrap();
    let u = h
        .engine
        .update(r.id, ReservationPatch { party_size: Some(2), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(u.party_size, 2);
    assert_eq!(u.note.as_deref(), Some("birthday"));
    assert_eq!((u.start, u.end), (r.start, r.end));
}

#[tokio::test]
async fn update_into_neighbour_conflicts() {
    let h = Harness::open("update_neighbour.wal");
    let first = h.engine.create(h.booking(at(12, 0), at(13, 0), 2)).await.unwrap();
    let second = h.engine.create(h.booking(at(15, 0), at(16, 0), 2)).await.unwrap();
    let patch = ReservationPatch {
        start: Some(at(13, 10)),
        end: Some(at(14, 0)),
        ..Default::default()
    };
    let err = h.engine.update(second.id, patch).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(id) if id == first.id));
    assert_eq!(h.engine.get(second.id).await.unwrap().start, at(15, 0));
}

#[tokio::test]
async fn update_revalidates_capacity() {
    let h = Harness::open("update_capacity.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let err = h
        .engine
        .update(r.id, ReservationPatch { party_size: Some(6), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(ValidationError::ExceedsCapacity { .. })));
}

#[tokio::test]
async fn update_moves_to_another_table() {
    let h = Harness::open("update_table.wal");
    let t2 = table(2, 6, 2000);
    h.registry.insert_table(t2.clone());
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();

    let u = h
        .engine
        .update(r.id, ReservationPatch { table_id: Some(t2.id), party_size: Some(6), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(u.table_id, t2.id);
    assert!(h.engine.list_for_table(h.t1.id, tomorrow()).await.unwrap().is_empty());
    assert_eq!(h.engine.list_for_table(t2.id, tomorrow()).await.unwrap().len(), 1);

    // The old slot on T1 is free again.
    h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
}

#[tokio::test]
async fn update_onto_maintenance_table_rejected() {
    let h = Harness::open("update_maintenance.wal");
    let mut t2 = table(2, 4, 1500);
    t2.status = TableStatus::Maintenance;
    h.registry.insert_table(t2.clone());
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    let err = h
        .engine
        .update(r.id, ReservationPatch { table_id: Some(t2.id), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BusinessRule(BusinessRule::TableUnavailable)));
}

#[tokio::test]
async fn update_cancelled_rejected() {
    let h = Harness::open("update_cancelled.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    h.engine.cancel(r.id).await.unwrap();
    let err = h
        .engine
        .update(r.id, ReservationPatch { party_size: Some(2), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BusinessRule(BusinessRule::UpdateCancelled)));
    assert_eq!(err.to_string(), "cannot update a cancelled reservation");
}

#[tokio::test]
async fn update_checked_in_allowed() {
    let h = Harness::open("update_checked_in.wal");
    let r = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
    h.engine.check_in(r.id).await.unwrap();
    let u = h
        .engine
        .update(r.id, ReservationPatch { end: Some(at(17, 0)), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(u.status, ReservationStatus::CheckedIn);
    assert_eq!(u.end, at(17, 0));
}

#[tokio::test]
async fn update_unknown_is_not_found() {
    let h = Harness::open("update_unknown.wal");
    let err = h
        .engine
        .update(Ulid::new(), ReservationPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: Entity::Reservation, .. }));
}

// ── Availability ─────────────────────────────────────────

fn query(start: NaiveTime, end: NaiveTime, party_size: u32) -> AvailabilityQuery {
    AvailabilityQuery {
        date: tomorrow(),
        start,
        end,
        party_size,
        window_seat: false,
        accessible: false,
    }
}

#[tokio::test]
async fn availability_capacity_filter() {
    let h = Harness::open("avail_capacity.wal");
    let quotes = h.engine.find_available(&query(at(14, 0), at(16, 0), 5)).await.unwrap();
    assert!(quotes.is_empty());
}

#[tokio::test]
async fn availability_prices_and_orders() {
    let h = Harness::open("avail_order.wal");
    let big = table(2, 8, 1000);
    let window = Table { window_seat: true, ..table(3, 4, 2500) };
    h.registry.insert_table(big.clone());
    h.registry.insert_table(window.clone());

    let quotes = h.engine.find_available(&query(at(14, 0), at(16, 0), 2)).await.unwrap();
    let ids: Vec<TableId> = quotes.iter().map(|q| q.table.id).collect();
    assert_eq!(ids, vec![big.id, h.t1.id, window.id]);
    let prices: Vec<Cents> = quotes.iter().map(|q| q.total_price).collect();
    assert_eq!(prices, vec![2000, 3000, 5000]);
}

#[tokio::test]
async fn availability_excludes_booked_and_maintenance() {
    let h = Harness::open("avail_booked.wal");
    let spare = table(2, 4, 1500);
    let broken = Table { status: TableStatus::Maintenance, ..table(3, 4, 500) };
    h.registry.insert_table(spare.clone());
    h.registry.insert_table(broken);
    h.engine.create(h.booking(at(13, 0), at(14, 0), 2)).await.unwrap();

    let quotes = h.engine.find_available(&query(at(14, 0), at(16, 0), 2)).await.unwrap();
    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0].table.id, spare.id);

    // 14:15 clears T1's buffer.
    let quotes = h.engine.find_available(&query(at(14, 15), at(16, 0), 2)).await.unwrap();
    assert_eq!(quotes.len(), 2);
}

#[tokio::test]
async fn availability_attribute_filters() {
    let h = Harness::open("avail_attrs.wal");
    let window = Table { window_seat: true, ..table(2, 4, 1500) };
    let ramp = Table { accessible: true, ..table(3, 4, 1500) };
    h.registry.insert_table(window.clone());
    h.registry.insert_table(ramp.clone());

    let mut q = query(at(14, 0), at(16, 0), 2);
    q.window_seat = true;
    let quotes = h.engine.find_available(&q).await.unwrap();
    assert_eq!(quotes.iter().map(|q| q.table.id).collect::<Vec<_>>(), vec![window.id]);

    let mut q = query(at(14, 0), at(16, 0), 2);
    q.accessible = true;
    let quotes = h.engine.find_available(&q).await.unwrap();
    assert_eq!(quotes.iter().map(|q| q.table.id).collect::<Vec<_>>(), vec![ramp.id]);
}

#[tokio::test]
async fn availability_validates_input() {
    let h = Harness::open("avail_validate.wal");
    let mut past = query(at(14, 0), at(16, 0), 2);
    past.date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
    assert!(matches!(
        h.engine.find_available(&past).await,
        Err(EngineError::Validation(ValidationError::PastDate { .. }))
    ));
    assert!(matches!(
        h.engine.find_available(&query(at(16, 0), at(14, 0), 2)).await,
        Err(EngineError::Validation(ValidationError::InvalidTimeRange { .. }))
    ));
    assert!(matches!(
        h.engine.find_available(&query(at(14, 0), at(16, 0), 0)).await,
        Err(EngineError::Validation(ValidationError::PartySizeOutOfBounds(0)))
    ));
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn list_by_customer_in_date_order() {
    let h = Harness::open("by_customer.wal");
    let later = h.engine.create(h.booking(at(18, 0), at(19, 0), 2)).await.unwrap();
    let earlier = h.engine.create(h.booking(at(11, 0), at(12, 0), 2)).await.unwrap();
    let rows = h.engine.list_by_customer(h.customer).await.unwrap();
    assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![earlier.id, later.id]);
}

#[tokio::test]
async fn list_for_table_includes_cancelled() {
    let h = Harness::open("for_table.wal");
    let r = h.engine.create(h.booking(at(11, 0), at(12, 0), 2)).await.unwrap();
    h.engine.cancel(r.id).await.unwrap();
    h.engine.create(h.booking(at(11, 0), at(12, 0), 2)).await.unwrap();
    let rows = h.engine.list_for_table(h.t1.id, tomorrow()).await.unwrap();
    assert_eq!(rows.len(), 2);

    let err = h.engine.list_for_table(Ulid::new(), tomorrow()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: Entity::Table, .. }));
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_creates_for_one_slot_admit_one() {
    let h = Harness::open("race_one_slot.wal");
    let mut handles = Vec::new();
    for _ in 0..32 {
        let engine = h.engine.clone();
        let req = h.booking(at(14, 0), at(16, 0), 2);
        handles.push(tokio::spawn(async move { engine.create(req).await }));
    }
    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(h.engine.list_for_table(h.t1.id, tomorrow()).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_staggered_creates_never_overlap() {
    let h = Harness::open("race_staggered.wal");
    let mut handles = Vec::new();
    for i in 0..40u32 {
        let engine = h.engine.clone();
        let start = at(10, 0) + chrono::Duration::minutes(i64::from(i) * 10);
        let req = h.booking(start, start + chrono::Duration::minutes(50), 2);
        handles.push(tokio::spawn(async move { engine.create(req).await }));
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    let rows = h.engine.list_for_table(h.t1.id, tomorrow()).await.unwrap();
    assert!(!rows.is_empty());
    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            assert!(
                !overlaps(&a.span(), &b.span(), h.engine.config().buffer),
                "{}-{} overlaps {}-{}",
                a.start,
                a.end,
                b.start,
                b.end
            );
        }
    }
}

async fn assert_no_overlap(h: &Harness, table_id: TableId) {
    let rows: Vec<_> = h
        .engine
        .list_for_table(table_id, tomorrow())
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.is_active())
        .collect();
    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            assert!(
                !overlaps(&a.span(), &b.span(), h.engine.config().buffer),
                "{}-{} overlaps {}-{}",
                a.start,
                a.end,
                b.start,
                b.end
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_moves_onto_one_slot_admit_one() {
    let h = Harness::open("race_moves.wal");
    let mut movers = Vec::new();
    for n in 2..=13 {
        let t = table(n, 4, 1500);
        h.registry.insert_table(t.clone());
        let req = NewReservation { table_id: t.id, ..h.booking(at(18, 0), at(19, 0), 2) };
        movers.push(h.engine.create(req).await.unwrap());
    }

    let mut handles = Vec::new();
    for r in &movers {
        let engine = h.engine.clone();
        let patch = ReservationPatch {
            table_id: Some(h.t1.id),
            start: Some(at(14, 0)),
            end: Some(at(16, 0)),
            ..Default::default()
        };
        let id = r.id;
        handles.push(tokio::spawn(async move { engine.update(id, patch).await.map(|_| ()) }));
    }
    for _ in 0..4 {
        let engine = h.engine.clone();
        let req = h.booking(at(14, 30), at(15, 30), 2);
        handles.push(tokio::spawn(async move { engine.create(req).await.map(|_| ()) }));
    }

    let results = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        futures::future::join_all(handles),
    )
    .await
    .expect("moves deadlocked");
    let mut won = 0;
    for result in results {
        match result.unwrap() {
            Ok(()) => won += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(h.engine.list_for_table(h.t1.id, tomorrow()).await.unwrap().len(), 1);
    assert_no_overlap(&h, h.t1.id).await;

    // Moves that lost keep their original table and window.
    let mut moved = 0;
    for r in &movers {
        let now = h.engine.get(r.id).await.unwrap();
        if now.table_id == h.t1.id {
            moved += 1;
            assert_eq!((now.start, now.end), (at(14, 0), at(16, 0)));
        } else {
            assert_eq!(now, *r);
        }
    }
    assert!(moved <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_table_moves_do_not_deadlock() {
    let h = Harness::open("race_swap.wal");
    let t2 = table(2, 4, 1500);
    h.registry.insert_table(t2.clone());
    let a = h.engine.create(h.booking(at(11, 0), at(12, 0), 2)).await.unwrap();
    let b = h
        .engine
        .create(NewReservation { table_id: t2.id, ..h.booking(at(14, 0), at(15, 0), 2) })
        .await
        .unwrap();

    // A shuttles T1 -> T2 -> T1 while B shuttles T2 -> T1 -> T2. Their
    // windows never meet, so every move succeeds.
    let shuttle = |id: ReservationId, there: TableId, back: TableId| {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            for _ in 0..25 {
                for table_id in [there, back] {
                    let patch = ReservationPatch { table_id: Some(table_id), ..Default::default() };
                    engine.update(id, patch).await?;
                }
            }
            Ok::<_, EngineError>(())
        })
    };
    let forward = shuttle(a.id, t2.id, h.t1.id);
    let backward = shuttle(b.id, h.t1.id, t2.id);
    let (fwd, bwd) = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        (forward.await, backward.await)
    })
    .await
    .expect("opposite moves deadlocked");
    fwd.unwrap().unwrap();
    bwd.unwrap().unwrap();

    assert_eq!(h.engine.get(a.id).await.unwrap().table_id, h.t1.id);
    assert_eq!(h.engine.get(b.id).await.unwrap().table_id, t2.id);
    assert_no_overlap(&h, h.t1.id).await;
    assert_no_overlap(&h, t2.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contested_swap_rejects_both_moves() {
    let h = Harness::open("race_contested_swap.wal");
    let t2 = table(2, 4, 1500);
    h.registry.insert_table(t2.clone());
    let a = h.engine.create(h.booking(at(14, 0), at(16, 0), 2)).await.unwrap();
    let b = h
        .engine
        .create(NewReservation { table_id: t2.id, ..h.booking(at(14, 0), at(16, 0), 2) })
        .await
        .unwrap();

    let move_to = |id: ReservationId, table_id: TableId| {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            engine
                .update(id, ReservationPatch { table_id: Some(table_id), ..Default::default() })
                .await
        })
    };
    let first = move_to(a.id, t2.id);
    let second = move_to(b.id, h.t1.id);
    let (first, second) = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        (first.await, second.await)
    })
    .await
    .expect("contested swap deadlocked");

    // Each target stays occupied by the other reservation, so neither move can land.
    assert_eq!(first.unwrap().unwrap_err().kind(), ErrorKind::Conflict);
    assert_eq!(second.unwrap().unwrap_err().kind(), ErrorKind::Conflict);
    assert_eq!(h.engine.get(a.id).await.unwrap().table_id, h.t1.id);
    assert_eq!(h.engine.get(b.id).await.unwrap().table_id, t2.id);
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn bookings_survive_restart() {
    let path = test_wal_path("restart.wal");
    let (customer, t1, kept, cancelled) = {
        let h = Harness::open_at(&path);
        let kept = h.engine.create(h.booking(at(14, 0), at(16, 0), 4)).await.unwrap();
        let cancelled = h.engine.create(h.booking(at(18, 0), at(19, 0), 2)).await.unwrap();
        h.engine.cancel(cancelled.id).await.unwrap();
        (h.customer, h.t1.clone(), kept, cancelled)
    };

    let registry = Arc::new(InMemoryRegistry::new());
    registry.insert_table(t1.clone());
    let directory = Arc::new(InMemoryDirectory::new());
    directory.insert_customer(customer);
    let store = Arc::new(WalStore::open(&path, 15 * M).unwrap());
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()));
    let engine = Engine::new(registry, directory, store, clock, EngineConfig::default());

    assert_eq!(engine.get(kept.id).await.unwrap(), kept);
    assert_eq!(
        engine.get(cancelled.id).await.unwrap().status,
        ReservationStatus::Cancelled
    );
    let clash = NewReservation {
        customer_id: customer,
        table_id: t1.id,
        date: tomorrow(),
        start: at(15, 0),
        end: at(17, 0),
        party_size: 2,
        note: None,
    };
    assert!(matches!(engine.create(clash).await, Err(EngineError::Conflict(_))));
}
