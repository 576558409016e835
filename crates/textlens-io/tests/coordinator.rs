//! Integration tests: drive the reprocessing coordinator through its edit API.

#![allow(clippy::unwrap_used, clippy::cast_possible_truncation)]

use std::time::Duration;

use image::Rgba;
use textlens_io::{Coordinator, CoordinatorConfig, HomographyState, PipelineState, SessionError};
use textlens_pipeline::{
    FilterKind, FilterParams, HomographySettings, PipelineError, PixelBuffer, Point,
};
use tokio::sync::watch;

const TIMEOUT: Duration = Duration::from_secs(30);

fn gradient(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

/// Wait until the coordinator publishes `Ready` or `Failed` for the
/// current reload counter.
async fn settled(coordinator: &Coordinator) -> PipelineState {
    let target = coordinator.reload_counter();
    let mut rx = coordinator.subscribe();
    wait_for(&mut rx, |state| match state {
        PipelineState::Ready { generation, .. } | PipelineState::Failed { generation, .. } => {
            *generation == target
        }
        _ => false,
    })
    .await
}

async fn wait_for(
    rx: &mut watch::Receiver<PipelineState>,
    predicate: impl FnMut(&PipelineState) -> bool,
) -> PipelineState {
    tokio::time::timeout(TIMEOUT, rx.wait_for(predicate))
        .await
        .unwrap()
        .unwrap()
        .clone()
}

fn debounced(ms: u64) -> CoordinatorConfig {
    CoordinatorConfig {
        idle_debounce_ms: ms,
        busy_debounce_ms: ms,
        ..CoordinatorConfig::default()
    }
}

#[test]
fn spawn_outside_runtime_fails() {
    let err = Coordinator::spawn(CoordinatorConfig::default()).unwrap_err();
    assert!(matches!(err, SessionError::NoRuntime));
    assert_eq!(err.code(), "no_runtime");
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_config_rejected() {
    let mut config = CoordinatorConfig::default();
    config.pipeline.block_size = 0;
    let err = Coordinator::spawn(config).unwrap_err();
    assert_eq!(err.code(), "invalid_config");
}

#[tokio::test(flavor = "multi_thread")]
async fn edits_without_source_stay_idle() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    coordinator.add_filter(FilterKind::Grayscale);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(coordinator.state(), PipelineState::Idle));
    let stats = coordinator.stats();
    assert_eq!(stats.scheduled, 1);
    assert_eq!(stats.started, 0);
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn source_image_publishes_ready() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    let dims = coordinator.set_source_image(gradient(32, 24));
    assert_eq!((dims.width, dims.height), (32, 24));

    let PipelineState::Ready {
        corrected,
        filtered,
        ..
    } = settled(&coordinator).await
    else {
        unreachable!("expected Ready");
    };
    // Empty chain, no correction: the source comes back unchanged.
    assert_eq!(*filtered, gradient(32, 24));
    assert_eq!(*corrected, gradient(32, 24));
    assert_eq!(coordinator.stats().published, 1);
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn burst_of_edits_collapses_into_one_recomputation() {
    let coordinator = Coordinator::spawn(debounced(200)).unwrap();
    let source = gradient(64, 48);
    coordinator.set_source_image(source.clone());
    let id = coordinator.add_filter(FilterKind::Binary);
    coordinator.change_strength(id, 40).unwrap();
    coordinator.change_strength(id, 90).unwrap();
    coordinator.change_strength(id, 200).unwrap();

    let PipelineState::Ready {
        generation,
        filtered,
        ..
    } = settled(&coordinator).await
    else {
        unreachable!("expected Ready");
    };
    assert_eq!(generation, coordinator.reload_counter());
    assert_eq!(*filtered, textlens_pipeline::binary::binary(&source, 200).unwrap());

    let stats = coordinator.stats();
    assert_eq!(stats.scheduled, 5);
    assert_eq!(stats.started, 1);
    assert_eq!(stats.superseded, 0);
    assert_eq!(stats.published, 1);
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rapid_strength_changes_publish_only_the_last() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    let source = gradient(320, 240);
    coordinator.set_source_image(source.clone());
    let id = coordinator.add_filter(FilterKind::Binary);
    settled(&coordinator).await;
    let before = coordinator.stats();

    let target = coordinator.reload_counter() + 3;
    let mut rx = coordinator.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if let PipelineState::Ready {
                generation,
                filtered,
                ..
            } = state
            {
                seen.push((generation, filtered));
                if generation == target {
                    break;
                }
            }
        }
        seen
    });

    coordinator.change_strength(id, 40).unwrap();
    coordinator.change_strength(id, 90).unwrap();
    coordinator.change_strength(id, 200).unwrap();
    assert_eq!(coordinator.reload_counter(), target);

    let seen = tokio::time::timeout(TIMEOUT, observer)
        .await
        .unwrap()
        .unwrap();
    let expected = textlens_pipeline::binary::binary(&source, 200).unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, target);
    assert_eq!(*seen[0].1, expected);

    let stats = coordinator.stats();
    assert_eq!(stats.published, before.published + 1);
    assert_eq!(stats.failed, before.failed);
    assert!(stats.started >= stats.published);
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn idle_edit_starts_at_once() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    let start = tokio::time::Instant::now();
    coordinator.set_source_image(gradient(16, 16));

    let PipelineState::Ready { generation, .. } = settled(&coordinator).await else {
        unreachable!("expected Ready");
    };
    assert_eq!(generation, 1);
    // Timer deadlines round up to the next millisecond.
    assert!(start.elapsed() <= Duration::from_millis(1));
    assert_eq!(coordinator.stats().started, 1);
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn busy_edit_waits_out_the_debounce_window() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    let mut rx = coordinator.subscribe();
    let ids: Vec<_> = (0..3)
        .map(|_| {
            coordinator
                .add_filter_with(FilterKind::Median, 20, FilterParams::None)
                .unwrap()
        })
        .collect();
    coordinator.set_source_image(gradient(1080, 1080));
    wait_for(&mut rx, PipelineState::is_recomputing).await;
    assert_eq!(coordinator.stats().started, 1);

    coordinator.change_strength(ids[0], 19).unwrap();
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_millis(249)).await;
    let stats = coordinator.stats();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.superseded, 0);
    assert!(!rx.has_changed().unwrap());

    tokio::time::advance(Duration::from_millis(2)).await;
    tokio::time::timeout(TIMEOUT, rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(rx.borrow().is_recomputing());
    let stats = coordinator.stats();
    assert_eq!(stats.started, 2);
    assert_eq!(stats.superseded, 1);

    settled(&coordinator).await;
    assert_eq!(coordinator.stats().published, 1);
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn new_source_supersedes_running_recomputation() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    let mut rx = coordinator.subscribe();
    for _ in 0..3 {
        coordinator
            .add_filter_with(FilterKind::Median, 20, FilterParams::None)
            .unwrap();
    }
    coordinator.set_source_image(gradient(1080, 1080));
    wait_for(&mut rx, PipelineState::is_recomputing).await;

    coordinator.set_source_image(gradient(8, 8));
    let PipelineState::Ready { filtered, .. } = settled(&coordinator).await else {
        unreachable!("expected Ready");
    };
    assert_eq!(filtered.dimensions(), (8, 8));

    let stats = coordinator.stats();
    assert_eq!(stats.superseded, 1);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.failed, 0);
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn recomputing_carries_previous_image() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    coordinator.set_source_image(gradient(600, 600));
    settled(&coordinator).await;

    let mut rx = coordinator.subscribe();
    coordinator
        .add_filter_with(FilterKind::Median, 20, FilterParams::None)
        .unwrap();
    let PipelineState::Recomputing { previous } =
        wait_for(&mut rx, PipelineState::is_recomputing).await
    else {
        unreachable!("expected Recomputing");
    };
    assert_eq!(previous.as_deref(), Some(&gradient(600, 600)));
    settled(&coordinator).await;
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_edits_are_rejected_without_scheduling() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    let id = coordinator.add_filter(FilterKind::Contrast);
    let scheduled = coordinator.stats().scheduled;

    let err = coordinator.change_strength(id, 259).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Pipeline(PipelineError::InvalidStrength { .. })
    ));
    let err = coordinator.change_strength(id, 501).unwrap_err();
    assert_eq!(err.code(), "invalid_strength");

    coordinator.remove_filter(id).unwrap();
    let err = coordinator.remove_filter(id).unwrap_err();
    assert_eq!(err.code(), "unknown_filter");

    let err = coordinator
        .apply_homography(HomographySettings::from_size(10.0, 10.0, 1.0))
        .unwrap_err();
    assert!(matches!(err, SessionError::NoSourceImage));

    // Only the successful removal was scheduled.
    assert_eq!(coordinator.stats().scheduled, scheduled + 1);
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn homography_selection_lifecycle() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    coordinator.set_source_image(gradient(40, 30));
    settled(&coordinator).await;
    let before = coordinator.stats().scheduled;

    let working = coordinator.begin_homography_selection(2.0).unwrap();
    assert!((working.display_width - 80.0).abs() < f64::EPSILON);
    assert!(matches!(
        coordinator.homography_state(),
        HomographyState::Selecting(_)
    ));
    coordinator.cancel_homography_selection();
    assert!(matches!(
        coordinator.homography_state(),
        HomographyState::NotShown
    ));
    // Selecting and cancelling never recompute.
    assert_eq!(coordinator.stats().scheduled, before);

    let mut settings = coordinator.begin_homography_selection(1.0).unwrap();
    assert!(coordinator.drag_homography_corner(Point::new(3.0, 2.0)).is_some());
    settings.top_left = Point::new(5.0, 5.0);
    settings.top_right = Point::new(35.0, 5.0);
    settings.bottom_left = Point::new(5.0, 25.0);
    settings.bottom_right = Point::new(35.0, 25.0);
    coordinator.apply_homography(settings).unwrap();
    assert!(matches!(
        coordinator.homography_state(),
        HomographyState::Selected(applied) if applied == settings
    ));

    let PipelineState::Ready {
        corrected,
        filtered,
        ..
    } = settled(&coordinator).await
    else {
        unreachable!("expected Ready");
    };
    assert_eq!(corrected.dimensions(), (30, 20));
    assert_eq!(filtered.dimensions(), (30, 20));

    coordinator.clear_homography();
    let PipelineState::Ready { filtered, .. } = settled(&coordinator).await else {
        unreachable!("expected Ready");
    };
    assert_eq!(filtered.dimensions(), (40, 30));
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn filter_settings_track_configuration() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    let first = coordinator.add_filter(FilterKind::Grayscale);
    let second = coordinator.add_filter(FilterKind::Sharpen);

    let settings = coordinator.filter_settings();
    assert_eq!(settings.filters.len(), 2);
    assert_eq!(settings.configuring, Some(second));

    coordinator.select_filter_to_configure(first).unwrap();
    coordinator.move_filter(first, 1).unwrap();
    let settings = coordinator.filter_settings();
    assert_eq!(settings.configuring_filter().unwrap().id(), first);
    assert_eq!(settings.filters[1].id(), first);

    coordinator.remove_filter(first).unwrap();
    assert_eq!(coordinator.filter_settings().configuring, None);
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn edge_color_params_flow_through() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    let mut source = PixelBuffer::from_pixel(12, 12, Rgba([0, 0, 0, 255]));
    for y in 0..12 {
        for x in 6..12 {
            source.put_pixel(x, y, Rgba([255, 255, 255, 255]));
        }
    }
    coordinator.set_source_image(source);
    let id = coordinator.add_filter(FilterKind::EdgeColoring);
    coordinator
        .change_params(id, FilterParams::EdgeColoring { color: [0, 0, 255] })
        .unwrap();
    assert!(coordinator.change_params(id, FilterParams::None).is_err());

    let PipelineState::Ready { filtered, .. } = settled(&coordinator).await else {
        unreachable!("expected Ready");
    };
    assert!(filtered.pixels().any(|p| p.0 == [0, 0, 255, 255]));
    assert!(!filtered.pixels().any(|p| p.0 == [255, 0, 0, 255]));
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_closes_state_channel() {
    let coordinator = Coordinator::spawn(CoordinatorConfig::default()).unwrap();
    let mut rx = coordinator.subscribe();
    coordinator.shutdown().await;
    assert!(rx.changed().await.is_err());
}
