//! Integration tests for the capture → export → upload flow.

use std::sync::Arc;

use scanner_lib::error::ExportCause;
use scanner_lib::fixtures;
use scanner_lib::harness::{FakeEngine, GatedArchiveWriter, TestHarness};
use scanner_lib::ScanError;
use shared::{ExportFormat, ScanEvent, SessionState};

#[tokio::test]
async fn test_end_to_end_facet_export_and_upload() {
    let h = TestHarness::new();
    assert_eq!(h.scanner.state(), SessionState::Idle);

    h.scanner.start_scan().await.unwrap();
    assert_eq!(h.scanner.state(), SessionState::Scanning);

    let scene = h.scanner.stop_scan().await.unwrap();
    assert_eq!(scene.node_count(), 1);
    assert_eq!(scene.vertex_count(), 4);
    assert_eq!(scene.triangle_count(), 2);

    let artifact = h.scanner.export(ExportFormat::FacetFormat).await.unwrap();
    let text = h.read_text(&artifact);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.first(), Some(&"solid scan"));
    assert_eq!(lines.last(), Some(&"endsolid scan"));
    assert_eq!(lines.iter().filter(|l| l.trim_start().starts_with("facet normal")).count(), 2);

    let receipt = h
        .scanner
        .upload(&artifact, "https://example/ingest")
        .await
        .unwrap();
    assert_eq!(receipt.destination, "https://example/ingest");
    assert_eq!(receipt.byte_len, artifact.byte_len);

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].bytes, text.as_bytes());
}

#[tokio::test]
async fn test_every_format_exports_valid_artifact() {
    let h = TestHarness::with_scene(fixtures::multi_node_scene());
    h.capture().await.unwrap();

    for &format in ExportFormat::all() {
        let artifact = h.scanner.export(format).await.unwrap();
        assert_eq!(artifact.format, format);
        let problems = h.validate(&artifact);
        assert!(problems.is_empty(), "{format}: {problems:?}");
    }
    assert_eq!(h.file_count(), ExportFormat::all().len());
}

#[tokio::test]
async fn test_export_outside_captured_is_no_scene() {
    let h = TestHarness::new();
    assert_eq!(
        h.scanner.export(ExportFormat::Archive).await.unwrap_err(),
        ScanError::NoScene
    );
    h.scanner.start_scan().await.unwrap();
    assert_eq!(
        h.scanner.export(ExportFormat::Archive).await.unwrap_err(),
        ScanError::NoScene
    );
    assert_eq!(h.file_count(), 0);
}

#[tokio::test]
async fn test_degenerate_triangle_exports() {
    let h = TestHarness::with_scene(fixtures::degenerate_scene());
    h.capture().await.unwrap();
    let artifact = h.scanner.export(ExportFormat::FacetFormat).await.unwrap();
    assert!(h.read_text(&artifact).contains("facet normal 0 0 0"));
}

#[tokio::test]
async fn test_points_only_scene_facet_export_fails_cleanly() {
    let h = TestHarness::with_scene(fixtures::points_only_scene());
    h.capture().await.unwrap();

    let err = h.scanner.export(ExportFormat::FacetFormat).await.unwrap_err();
    match err {
        ScanError::Export(e) => {
            assert_eq!(e.format, ExportFormat::FacetFormat);
            assert_eq!(e.cause, ExportCause::EmptyScene);
        }
        other => panic!("Expected export error, got {other:?}"),
    }
    assert_eq!(h.file_count(), 0);

    // the same scene still exports as a text mesh
    h.scanner.export(ExportFormat::TextMesh).await.unwrap();
}

#[tokio::test]
async fn test_second_export_while_running_is_busy() {
    let writer = GatedArchiveWriter::new();
    let h = Arc::new(TestHarness::with_archive_writer(
        fixtures::two_triangle_scene(),
        Arc::new(writer.clone()),
    ));
    h.capture().await.unwrap();

    let pending = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.scanner.export(ExportFormat::Archive).await })
    };
    writer.wait_until_blocked().await;

    let err = h.scanner.export(ExportFormat::TextMesh).await.unwrap_err();
    assert_eq!(err, ScanError::ExportBusy);
    assert!(err.is_retry_safe());

    // capture is not blocked by a running export
    h.scanner.start_scan().await.unwrap();
    h.scanner.stop_scan().await.unwrap();

    writer.release();
    pending.await.unwrap().unwrap();
    h.scanner.export(ExportFormat::TextMesh).await.unwrap();
}

#[tokio::test]
async fn test_overlapping_stop_is_rejected() {
    let h = Arc::new(TestHarness::with_engine(
        FakeEngine::new(fixtures::two_triangle_scene()).with_gate(),
    ));
    let pending = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.scanner.start_scan().await })
    };
    h.engine.wait_until_blocked().await;
    assert_eq!(
        h.scanner.stop_scan().await.unwrap_err(),
        ScanError::OperationInProgress
    );
    h.engine.release();
    pending.await.unwrap().unwrap();
    assert_eq!(h.scanner.state(), SessionState::Scanning);
}

#[tokio::test]
async fn test_upload_after_artifact_deleted() {
    let h = TestHarness::new();
    h.capture().await.unwrap();
    let artifact = h.scanner.export(ExportFormat::TextMesh).await.unwrap();
    std::fs::remove_file(&artifact.path).unwrap();

    let err = h
        .scanner
        .upload(&artifact, "https://example/ingest")
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::ArtifactMissing { .. }));
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn test_event_order() {
    let h = TestHarness::new();
    let mut rx = h.scanner.subscribe();

    h.capture().await.unwrap();
    let artifact = h.scanner.export(ExportFormat::FacetFormat).await.unwrap();
    let receipt = h
        .scanner
        .upload(&artifact, "https://example/ingest")
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 5);
    assert_eq!(events[0], ScanEvent::ScanStarted);
    assert!(matches!(events[1], ScanEvent::ScanStopped { .. }));
    assert_eq!(
        events[2],
        ScanEvent::ExportStarted {
            format: ExportFormat::FacetFormat
        }
    );
    assert_eq!(events[3], ScanEvent::ExportSucceeded { artifact });
    assert_eq!(events[4], ScanEvent::UploadSucceeded { receipt });
}

#[tokio::test]
async fn test_rescan_replaces_scene_but_keeps_artifact() {
    let h = TestHarness::new();
    h.capture().await.unwrap();
    let artifact = h.scanner.export(ExportFormat::TextMesh).await.unwrap();

    h.scanner.start_scan().await.unwrap();
    assert!(h.scanner.scene().is_none());
    assert_eq!(h.scanner.last_artifact(), Some(artifact.clone()));

    // uploads own no session state
    h.scanner
        .upload(&artifact, "https://example/ingest")
        .await
        .unwrap();
}
