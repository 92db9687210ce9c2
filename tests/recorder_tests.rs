// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Capture session behavior of the track recorder.

mod common;

use common::{drain_events, recorder_with, sample, stockholm_regions, MockRemote};
use dogtracks::db::{keys, KeyValueStore, LocalStore, SqliteStore};
use dogtracks::error::AppError;
use dogtracks::models::{EngineEvent, LatLng, Position, TrackId, TrackType, VerifiedStatus};
use dogtracks::services::recorder::RecorderState;
use dogtracks::services::{
    CorrectionPredictor, CorrectionRequest, RecorderSettings, RegionService, RemoteStore,
    TrackRecorder,
};
use std::sync::Arc;

// Inside the 50 m Stockholm circle, and 111 m north of its center
const INSIDE: (f64, f64) = (59.3340, 18.0665);
const OUTSIDE: (f64, f64) = (59.3350, 18.0665);

fn correction(status: VerifiedStatus, corrected: Option<LatLng>, snap: bool) -> CorrectionRequest {
    CorrectionRequest {
        verified_status: status,
        corrected_position: corrected,
        annotation_notes: None,
        snap,
        snap_distance_m: None,
    }
}

#[tokio::test]
async fn test_start_while_recording_is_rejected() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());

    recorder.start(TrackType::Human, None, None).await.unwrap();
    let err = recorder
        .start(TrackType::Human, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyRecording));
}

#[tokio::test]
async fn test_human_track_cannot_have_reference() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());

    let err = recorder
        .start(TrackType::Human, Some(TrackId::Remote(1)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(recorder.status().unwrap().state, RecorderState::Idle);
}

#[tokio::test]
async fn test_online_start_uses_server_id() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    recorder.set_connectivity(true);

    let track = recorder
        .start(TrackType::Human, None, Some("Morning walk".to_string()))
        .await
        .unwrap();
    assert_eq!(track.id, TrackId::Remote(42));
    assert_eq!(track.name, "Morning walk");

    let status = recorder.status().unwrap();
    assert_eq!(status.state, RecorderState::Recording);
    assert_eq!(status.track_id, Some(TrackId::Remote(42)));
    assert_eq!(status.pending, 0);
}

#[tokio::test]
async fn test_offline_start_uses_local_id_and_queues_create() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());

    let track = recorder.start(TrackType::Human, None, None).await.unwrap();
    assert!(track.id.is_local());
    assert!(track.name.starts_with("Human - "));
    assert_eq!(recorder.status().unwrap().pending, 1);
    assert!(remote.created().is_empty());
}

#[tokio::test]
async fn test_dog_start_waits_for_local_reference() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());

    let human = recorder.start(TrackType::Human, None, None).await.unwrap();
    recorder.record(sample(59.334, 18.066, 1)).unwrap();
    recorder.stop().unwrap();

    // Online again, but the human track has not been delivered yet
    recorder.set_connectivity(true);
    let dog = recorder
        .start(TrackType::Dog, Some(human.id), None)
        .await
        .unwrap();
    assert!(dog.id.is_local());
    assert!(remote.created().is_empty());

    let report = recorder.flush_now().await.unwrap().unwrap();
    assert_eq!(report.created, 2);
    let created = remote.created();
    assert_eq!(created[0].track_type, TrackType::Human);
    assert_eq!(created[1].track_type, TrackType::Dog);
    assert_eq!(created[1].human_track_id, Some(42));

    let detail = recorder.track_detail(TrackId::Remote(43)).await.unwrap();
    assert_eq!(detail.track.reference_track_id, Some(TrackId::Remote(42)));
    assert_eq!(recorder.status().unwrap().track_id, Some(TrackId::Remote(43)));
}

#[tokio::test]
async fn test_transient_failure_on_start_falls_back_to_local() {
    let remote = MockRemote::new();
    remote.set_offline(true);
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    recorder.set_connectivity(true);
    let mut rx = recorder.subscribe();

    let track = recorder.start(TrackType::Human, None, None).await.unwrap();
    assert!(track.id.is_local());
    assert!(!recorder.is_online());
    assert!(drain_events(&mut rx).contains(&EngineEvent::ConnectivityChanged { online: false }));
}

#[tokio::test]
async fn test_region_enter_and_exit() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), stockholm_regions());
    recorder.start(TrackType::Human, None, None).await.unwrap();

    let outcome = recorder.record(sample(INSIDE.0, INSIDE.1, 1)).unwrap();
    assert_eq!(outcome.entered, vec![1]);
    assert_eq!(outcome.contained, vec![1]);

    let outcome = recorder.record(sample(INSIDE.0, INSIDE.1, 2)).unwrap();
    assert!(outcome.entered.is_empty());
    assert!(outcome.exited.is_empty());

    let outcome = recorder.record(sample(OUTSIDE.0, OUTSIDE.1, 3)).unwrap();
    assert_eq!(outcome.exited, vec![1]);
    assert!(outcome.contained.is_empty());

    let recent = recorder.recent_events();
    assert_eq!(recent.len(), 2);
    assert!(matches!(recent[0], EngineEvent::RegionExited { region_id: 1, .. }));
    assert!(matches!(
        &recent[1],
        EngineEvent::RegionEntered { region_id: 1, name, .. } if name == "Stockholm"
    ));
}

#[tokio::test]
async fn test_record_requires_session() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    assert!(matches!(
        recorder.record(sample(59.0, 18.0, 1)),
        Err(AppError::NotRecording)
    ));
    assert!(matches!(recorder.stop(), Err(AppError::NotRecording)));
}

#[tokio::test]
async fn test_out_of_range_coordinate_is_rejected() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    recorder.start(TrackType::Human, None, None).await.unwrap();

    assert!(matches!(
        recorder.record(sample(95.0, 18.0, 1)),
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        recorder.record(sample(f64::NAN, 18.0, 1)),
        Err(AppError::BadRequest(_))
    ));
    assert_eq!(recorder.status().unwrap().pending, 1);
}

#[tokio::test]
async fn test_out_of_order_sample_is_rejected() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    recorder.start(TrackType::Human, None, None).await.unwrap();

    recorder.record(sample(59.0, 18.0, 10)).unwrap();
    let err = recorder.record(sample(59.0, 18.0, 5)).unwrap_err();
    assert!(matches!(err, AppError::OutOfOrderPosition { .. }));

    // Equal timestamps keep arrival order
    let outcome = recorder.record(sample(59.1, 18.0, 10)).unwrap();
    assert_eq!(outcome.position.id, 1);
    assert_eq!(recorder.status().unwrap().state, RecorderState::Recording);
}

#[tokio::test]
async fn test_stop_returns_track_and_ends_session() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), stockholm_regions());
    let started = recorder.start(TrackType::Human, None, None).await.unwrap();
    recorder.record(sample(INSIDE.0, INSIDE.1, 1)).unwrap();

    let stopped = recorder.stop().unwrap();
    assert_eq!(stopped.id, started.id);
    let status = recorder.status().unwrap();
    assert_eq!(status.state, RecorderState::Idle);
    assert!(status.contained.is_empty());
}

#[tokio::test]
async fn test_dog_session_reports_nearest_unresolved_spot() {
    let remote = MockRemote::new();
    let human = remote
        .create_track(&dogtracks::services::remote::NewTrack {
            track_type: TrackType::Human,
            name: Some("Layout".to_string()),
            human_track_id: None,
        })
        .await
        .unwrap();
    // About 10 m north and 15 m south of the sample point
    let near = remote.add_spot(human.id, LatLng::new(59.33409, 18.066), None);
    let far = remote.add_spot(human.id, LatLng::new(59.333865, 18.066), None);
    remote.add_spot(human.id, LatLng::new(59.334, 18.066), Some(true));

    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    recorder.set_connectivity(true);
    let dog = recorder
        .start(TrackType::Dog, Some(TrackId::Remote(human.id)), None)
        .await
        .unwrap();
    assert_eq!(dog.reference_track_id, Some(TrackId::Remote(human.id)));
    assert_eq!(remote.created()[1].human_track_id, Some(human.id));

    let mut rx = recorder.subscribe();
    let outcome = recorder.record(sample(59.334, 18.066, 1)).unwrap();
    let nearest = outcome.nearest_spot.expect("spot in range");
    assert_eq!(nearest.spot.id, near);
    assert!((nearest.distance_m - 10.0).abs() < 0.5);
    assert!(drain_events(&mut rx)
        .iter()
        .any(|e| matches!(e, EngineEvent::NearestHidingSpot { spot: Some(s), .. } if s.id == near)));

    let update = recorder.mark_spot_found(near, Some(true)).await.unwrap();
    assert!(update.synced);
    assert_eq!(remote.spot(near).unwrap().found, Some(true));

    let outcome = recorder.record(sample(59.334, 18.066, 2)).unwrap();
    assert_eq!(outcome.nearest_spot.map(|n| n.spot.id), Some(far));

    recorder.mark_spot_found(far, Some(false)).await.unwrap();
    let outcome = recorder.record(sample(59.334, 18.066, 3)).unwrap();
    assert!(outcome.nearest_spot.is_none());
    assert!(drain_events(&mut rx)
        .iter()
        .any(|e| matches!(e, EngineEvent::NearestHidingSpot { spot: None, .. })));
}

#[tokio::test]
async fn test_hiding_spot_range_is_twenty_meters() {
    let remote = MockRemote::new();
    let human = remote
        .create_track(&dogtracks::services::remote::NewTrack {
            track_type: TrackType::Human,
            name: None,
            human_track_id: None,
        })
        .await
        .unwrap();
    // One meter of latitude is 1 / 111_195 degrees on this sphere
    let south = remote.add_spot(human.id, LatLng::new(59.334 - 19.0 / 111_195.0, 18.066), None);
    remote.add_spot(human.id, LatLng::new(59.334 + 21.0 / 111_195.0, 18.066), None);

    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    recorder.set_connectivity(true);
    recorder
        .start(TrackType::Dog, Some(TrackId::Remote(human.id)), None)
        .await
        .unwrap();

    let outcome = recorder.record(sample(59.334, 18.066, 1)).unwrap();
    assert_eq!(outcome.nearest_spot.map(|n| n.spot.id), Some(south));

    recorder.mark_spot_found(south, Some(true)).await.unwrap();
    let outcome = recorder.record(sample(59.334, 18.066, 2)).unwrap();
    assert!(outcome.nearest_spot.is_none());
}

#[tokio::test]
async fn test_human_session_lays_out_hiding_spots() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    recorder.set_connectivity(true);
    let track = recorder.start(TrackType::Human, None, None).await.unwrap();

    assert!(matches!(
        recorder.add_hiding_spot(None).await,
        Err(AppError::BadRequest(_))
    ));
    recorder.record(sample(59.334, 18.066, 1)).unwrap();

    let spot = recorder.add_hiding_spot(None).await.unwrap();
    assert_eq!(spot.track_id, track.id);
    assert_eq!(spot.name, "Spot 1");
    assert_eq!(spot.position, LatLng::new(59.334, 18.066));

    let spot = recorder
        .add_hiding_spot(Some("Behind the shed".to_string()))
        .await
        .unwrap();
    assert_eq!(spot.name, "Behind the shed");
}

#[tokio::test]
async fn test_hiding_spot_needs_synced_track() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    recorder.start(TrackType::Human, None, None).await.unwrap();
    recorder.record(sample(59.334, 18.066, 1)).unwrap();

    assert!(matches!(
        recorder.add_hiding_spot(None).await,
        Err(AppError::TransientNetwork(_))
    ));
}

#[tokio::test]
async fn test_crashed_session_is_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.db");
    let remote = MockRemote::new();

    let track_id = {
        let recorder = recorder_with(&remote, LocalStore::open(&path).unwrap(), stockholm_regions());
        let track = recorder.start(TrackType::Human, None, None).await.unwrap();
        recorder.record(sample(INSIDE.0, INSIDE.1, 1)).unwrap();
        recorder.record(sample(INSIDE.0, INSIDE.1, 2)).unwrap();
        track.id
    };

    let recorder = recorder_with(&remote, LocalStore::open(&path).unwrap(), stockholm_regions());
    assert_eq!(recorder.recover().unwrap(), Some(track_id));
    let status = recorder.status().unwrap();
    assert_eq!(status.state, RecorderState::Recording);
    assert_eq!(status.contained, vec![1]);
    assert_eq!(status.pending, 3);

    // Containment was restored, so staying inside is not a new entry
    let outcome = recorder.record(sample(INSIDE.0, INSIDE.1, 3)).unwrap();
    assert!(outcome.entered.is_empty());
    assert_eq!(outcome.position.id, 2);
    let outcome = recorder.record(sample(OUTSIDE.0, OUTSIDE.1, 4)).unwrap();
    assert_eq!(outcome.exited, vec![1]);
    recorder.stop().unwrap();
    drop(recorder);

    let recorder = recorder_with(&remote, LocalStore::open(&path).unwrap(), stockholm_regions());
    assert_eq!(recorder.recover().unwrap(), None);
    let detail = recorder.track_detail(track_id).await.unwrap();
    assert_eq!(detail.positions.len(), 4);
}

#[tokio::test]
async fn test_local_store_failure_halts_recorder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.db");
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::open(&path).unwrap(), RegionService::default());
    let mut rx = recorder.subscribe();

    let track = recorder.start(TrackType::Human, None, None).await.unwrap();
    recorder.record(sample(59.0, 18.0, 1)).unwrap();

    let mut raw = SqliteStore::open(&path).unwrap();
    raw.put(keys::position(track.id, 0), b"not json".to_vec())
        .unwrap();

    let err = recorder.record(sample(59.0, 18.0, 2)).unwrap_err();
    assert!(matches!(err, AppError::LocalStoreCorruption(_)));

    let status = recorder.status().unwrap();
    assert_eq!(status.state, RecorderState::Halted);
    assert!(status.halted_reason.is_some());
    assert!(drain_events(&mut rx)
        .iter()
        .any(|e| matches!(e, EngineEvent::RecorderHalted { .. })));

    assert!(matches!(
        recorder.record(sample(59.0, 18.0, 3)),
        Err(AppError::LocalStoreCorruption(_))
    ));
    assert!(matches!(
        recorder.start(TrackType::Human, None, None).await,
        Err(AppError::LocalStoreCorruption(_))
    ));
}

#[tokio::test]
async fn test_correction_snaps_to_reference_track() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());

    let human = recorder.start(TrackType::Human, None, None).await.unwrap();
    for (i, lat) in [59.3340, 59.3342, 59.3344].into_iter().enumerate() {
        recorder.record(sample(lat, 18.066, i as i64)).unwrap();
    }
    recorder.stop().unwrap();

    let dog = recorder
        .start(TrackType::Dog, Some(human.id), None)
        .await
        .unwrap();
    recorder.record(sample(59.3341, 18.0661, 10)).unwrap();
    recorder.stop().unwrap();

    let outcome = recorder
        .correct_position(
            dog.id,
            0,
            correction(
                VerifiedStatus::Incorrect,
                Some(LatLng::new(59.33421, 18.066)),
                true,
            ),
        )
        .await
        .unwrap();
    assert_eq!(outcome.position.corrected_position, Some(LatLng::new(59.3342, 18.066)));
    assert_eq!(outcome.position.position, LatLng::new(59.3341, 18.0661));
    assert!(!outcome.synced);

    let detail = recorder.track_detail(dog.id).await.unwrap();
    assert_eq!(detail.positions[0].verified_status, VerifiedStatus::Incorrect);

    // Incorrect needs a coordinate; Correct clears it
    assert!(matches!(
        recorder
            .correct_position(dog.id, 0, correction(VerifiedStatus::Incorrect, None, false))
            .await,
        Err(AppError::BadRequest(_))
    ));
    let outcome = recorder
        .correct_position(dog.id, 0, correction(VerifiedStatus::Correct, None, false))
        .await
        .unwrap();
    assert_eq!(outcome.position.corrected_position, None);
}

#[tokio::test]
async fn test_correction_of_delivered_position_is_pushed() {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), RegionService::default());
    recorder.set_connectivity(true);
    let track = recorder.start(TrackType::Human, None, None).await.unwrap();
    recorder.record(sample(59.334, 18.066, 1)).unwrap();
    recorder.flush_now().await.unwrap().unwrap();

    let outcome = recorder
        .correct_position(track.id, 0, correction(VerifiedStatus::Correct, None, false))
        .await
        .unwrap();
    assert!(outcome.synced);
    let updates = remote.position_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(Some(updates[0].0), outcome.position.remote_id);
    assert_eq!(updates[0].1.verified_status, VerifiedStatus::Correct);
}

struct FirstReferencePoint;

impl CorrectionPredictor for FirstReferencePoint {
    fn suggest(&self, _position: &Position, reference: &[Position]) -> Option<LatLng> {
        reference.first().map(|p| p.position)
    }
}

#[tokio::test]
async fn test_predictor_suggests_correction() {
    let remote = MockRemote::new();
    let dyn_remote: Arc<dyn RemoteStore> = remote.clone();
    let recorder = Arc::new(
        TrackRecorder::new(
            LocalStore::in_memory(),
            dyn_remote,
            RegionService::default(),
            RecorderSettings::default(),
        )
        .with_predictor(Arc::new(FirstReferencePoint)),
    );

    let human = recorder.start(TrackType::Human, None, None).await.unwrap();
    recorder.record(sample(59.5, 18.5, 1)).unwrap();
    recorder.stop().unwrap();
    let dog = recorder
        .start(TrackType::Dog, Some(human.id), None)
        .await
        .unwrap();
    recorder.record(sample(59.6, 18.6, 2)).unwrap();

    assert_eq!(
        recorder.suggest_correction(dog.id, 0).unwrap(),
        Some(LatLng::new(59.5, 18.5))
    );
    assert_eq!(recorder.suggest_correction(human.id, 0).unwrap(), None);
}
