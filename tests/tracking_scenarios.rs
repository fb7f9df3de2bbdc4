//! End-to-end tracking scenarios against in-memory and SQLite stores.

use std::sync::Arc;

use trail_tracker::testing::{ManualClock, MockPositionSource, RecordingMap, ScriptedSurface};
use trail_tracker::{
    haversine_km, FixOutcome, GpsPoint, KeyValueStore, Lifecycle, MemoryStore, PositionFix,
    RecoveryOutcome, RouteTracker, RoutePoint, SaveOutcome, TrackerConfig, TrackerDeps,
};

const T0: i64 = 1_717_000_000_000;
const HOUR_MS: i64 = 3_600_000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Device {
    source: Arc<MockPositionSource>,
    map: Arc<RecordingMap>,
    surface: ScriptedSurface,
    clock: Arc<ManualClock>,
}

impl Device {
    fn new(now_ms: i64) -> Self {
        Self {
            source: Arc::new(MockPositionSource::new()),
            map: Arc::new(RecordingMap::default()),
            surface: ScriptedSurface::new(),
            clock: Arc::new(ManualClock::new(now_ms)),
        }
    }

    fn tracker(&self, store: Arc<dyn KeyValueStore>, config: TrackerConfig) -> RouteTracker {
        let deps = TrackerDeps {
            source: self.source.clone(),
            map: self.map.clone(),
            store,
            surface: Arc::new(self.surface.clone()),
            timer: self.clock.clone(),
        };
        RouteTracker::new(config, deps).unwrap()
    }

    fn fix(&self, tracker: &mut RouteTracker, lat: f64, lng: f64, accuracy_m: f64) -> FixOutcome {
        let handle = self.source.active().expect("no live subscription");
        tracker.on_fix(handle, PositionFix::new(lat, lng, accuracy_m))
    }

    fn advance(&self, tracker: &mut RouteTracker, ms: i64) {
        for tick in self.clock.advance(ms) {
            tracker.on_timer(tick);
        }
    }
}

/// Deterministic pseudo-random sequence in [0, 1).
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[test]
fn test_short_walk_with_inaccurate_fix() {
    init_logging();
    let device = Device::new(T0);
    let mut tracker = device.tracker(Arc::new(MemoryStore::new()), TrackerConfig::default());
    tracker.start().unwrap();

    device.fix(&mut tracker, 32.0000, 34.0000, 10.0);
    device.fix(&mut tracker, 32.0010, 34.0000, 10.0);
    let distance = tracker.stats().total_distance_km;
    assert!((distance - 0.111).abs() < 0.001);

    let outcome = device.fix(&mut tracker, 32.0020, 34.0000, 150.0);
    assert!(matches!(outcome, FixOutcome::Rejected(_)));
    assert_eq!(tracker.stats().total_distance_km, distance);
    assert_eq!(tracker.stats().point_count, 2);
}

#[test]
fn test_accepted_path_invariants_on_noisy_walk() {
    init_logging();
    let device = Device::new(T0);
    let mut tracker = device.tracker(Arc::new(MemoryStore::new()), TrackerConfig::default());
    tracker.start().unwrap();

    let mut rng = Lcg(42);
    let (mut lat, mut lng) = (46.5, 7.9);
    for _ in 0..500 {
        // Mix of jitter-sized and real steps with occasional bad accuracy
        let step = if rng.next() < 0.3 { 0.000_01 } else { 0.000_3 };
        lat += (rng.next() - 0.5) * step;
        lng += (rng.next() - 0.5) * step;
        let accuracy = if rng.next() < 0.1 { 250.0 } else { 3.0 + rng.next() * 40.0 };
        device.fix(&mut tracker, lat, lng, accuracy);
        device.advance(&mut tracker, 1_000);
    }

    let session = tracker.session();
    let path = session.path_points();
    assert!(path.len() > 10);

    let summed: f64 = path.windows(2).map(|w| haversine_km(&w[0], &w[1])).sum();
    assert!((session.total_distance_km() - summed).abs() < 1e-9);

    for pair in path.windows(2) {
        assert!(haversine_km(&pair[0], &pair[1]) >= 0.003);
    }
    for point in session.route_log() {
        if let RoutePoint::Location { accuracy, .. } = point {
            assert!(*accuracy <= 100.0);
        }
    }

    // Every accepted point after the first drew exactly one segment
    assert_eq!(device.map.segments().len(), path.len() - 1);
}

#[test]
fn test_pause_resume_leaves_route_untouched() {
    init_logging();
    let device = Device::new(T0);
    let mut tracker = device.tracker(Arc::new(MemoryStore::new()), TrackerConfig::default());
    tracker.start().unwrap();
    device.fix(&mut tracker, 32.0000, 34.0000, 10.0);
    device.fix(&mut tracker, 32.0010, 34.0000, 10.0);
    device.advance(&mut tracker, 10_000);

    let before = tracker.session().clone();
    tracker.toggle_pause().unwrap();
    device.advance(&mut tracker, 5 * 60_000);
    tracker.toggle_pause().unwrap();

    let after = tracker.session();
    assert_eq!(after.route_log(), before.route_log());
    assert_eq!(after.path_points(), before.path_points());
    assert_eq!(after.total_distance_km(), before.total_distance_km());
    assert_eq!(after.elapsed_ms(), before.elapsed_ms());
    assert_eq!(tracker.lifecycle(), Lifecycle::Tracking);
}

#[tokio::test]
async fn test_crash_and_restore_roundtrip() {
    init_logging();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let device = Device::new(T0);

    let (route, distance) = {
        let mut tracker = device.tracker(store.clone(), TrackerConfig::default());
        tracker.start().unwrap();
        device.fix(&mut tracker, 32.0000, 34.0000, 10.0);
        device.fix(&mut tracker, 32.0010, 34.0000, 10.0);
        device.advance(&mut tracker, 30_000);
        (
            tracker.session().route_log().to_vec(),
            tracker.session().total_distance_km(),
        )
        // Process dies without stop()
    };

    let restarted = Device::new(T0 + 2 * HOUR_MS);
    restarted.surface.answer_confirms(&[true]);
    let mut tracker = restarted.tracker(store.clone(), TrackerConfig::default());

    let outcome = tracker.recover_on_startup().await.unwrap();
    assert_eq!(outcome, RecoveryOutcome::Restored { points: 2 });
    assert_eq!(tracker.lifecycle(), Lifecycle::Idle);
    assert_eq!(tracker.session().route_log(), route.as_slice());
    assert_eq!(tracker.session().total_distance_km(), distance);
    assert_eq!(tracker.session().path_points().len(), 2);
    assert_eq!(restarted.map.segments().len(), 1);

    // The restored route can be saved like any other
    restarted.surface.answer_confirms(&[true]).answer_text(Some("Recovered hike"));
    let outcome = tracker.prompt_save().await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved(ref s) if s.name == "Recovered hike"));
    assert!(tracker.check_for_unsaved_route().is_none());
}

#[tokio::test]
async fn test_stale_snapshot_not_offered() {
    init_logging();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let device = Device::new(T0);
    {
        let mut tracker = device.tracker(store.clone(), TrackerConfig::default());
        tracker.start().unwrap();
        device.fix(&mut tracker, 32.0, 34.0, 10.0);
        device.advance(&mut tracker, 30_000);
    }
    let written_at = T0 + 30_000;

    // Exactly at the limit the snapshot is still offered
    let at_limit = Device::new(written_at + 24 * HOUR_MS);
    let tracker = at_limit.tracker(store.clone(), TrackerConfig::default());
    assert!(tracker.check_for_unsaved_route().is_some());

    let too_late = Device::new(written_at + 24 * HOUR_MS + 1);
    too_late.surface.answer_confirms(&[true]);
    let mut tracker = too_late.tracker(store.clone(), TrackerConfig::default());
    let outcome = tracker.recover_on_startup().await.unwrap();
    assert_eq!(outcome, RecoveryOutcome::NothingToRestore);
    assert!(too_late.surface.prompts().is_empty());
}

#[tokio::test]
async fn test_custom_config_from_json() {
    init_logging();
    let config = TrackerConfig::from_json(r#"{"max_accuracy_m": 20.0, "max_save_prompts": 1}"#).unwrap();
    let device = Device::new(T0);
    let mut tracker = device.tracker(Arc::new(MemoryStore::new()), config);
    tracker.start().unwrap();

    assert!(matches!(
        device.fix(&mut tracker, 32.0, 34.0, 50.0),
        FixOutcome::Rejected(_)
    ));
    device.fix(&mut tracker, 32.0, 34.0, 15.0);

    // One round only before the route is kept as unsaved
    let outcome = tracker.stop().await.unwrap();
    assert_eq!(outcome, SaveOutcome::Deferred);
    assert_eq!(device.surface.confirm_count(), 2);
}

#[cfg(feature = "persistence")]
#[tokio::test]
async fn test_sessions_survive_restart_with_sqlite() {
    use trail_tracker::SqliteStore;

    init_logging();
    let tmp_dir = tempfile::TempDir::new().unwrap();
    let db_path = tmp_dir.path().join("tracker.db");
    let db_path = db_path.to_str().unwrap();

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(db_path).unwrap());
        let device = Device::new(T0);
        device.surface.answer_confirms(&[true]).answer_text(Some("Lake loop"));
        let mut tracker = device.tracker(store, TrackerConfig::default());
        tracker.start().unwrap();
        device.fix(&mut tracker, 46.0, 8.0, 5.0);
        device.fix(&mut tracker, 46.001, 8.0, 5.0);
        assert!(matches!(tracker.stop().await, Some(SaveOutcome::Saved(_))));
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(db_path).unwrap());
    let device = Device::new(T0 + HOUR_MS);
    let tracker = device.tracker(store, TrackerConfig::default());
    let sessions = tracker.session_store().list();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name, "Lake loop");
    assert_eq!(sessions[0].data[1].coords(), Some(GpsPoint::new(46.001, 8.0)));
    assert!(tracker.check_for_unsaved_route().is_none());
}
