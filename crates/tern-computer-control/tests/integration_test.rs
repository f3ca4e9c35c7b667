use tern_computer_control::*;

#[tokio::test]
async fn test_controller_reports_consistent_capabilities() {
    let controller = create_controller(ControllerSettings::default());
    let caps = controller.capabilities();

    // Missing backends must come back as errors, never panics
    if !caps.screenshot {
        let result = controller.take_screenshot(CaptureTarget::FullScreen).await;
        assert!(matches!(result, Err(AutomationError::Unavailable(_))));
    }
    if !caps.clipboard {
        assert!(controller.clipboard_get().await.is_err());
    }
    assert!(!controller.backend_name().is_empty());
}

#[tokio::test]
async fn test_window_capture_of_unknown_window_fails_cleanly() {
    let controller = create_controller(ControllerSettings::default());
    let result = controller
        .take_screenshot(CaptureTarget::Window(
            "tern-window-that-does-not-exist-7f3a".to_string(),
        ))
        .await;
    assert!(result.is_err());
}

#[test]
fn test_key_chord_round_trips_through_display() {
    let chord: KeyChord = "alt+F4".parse().unwrap();
    assert_eq!(chord.to_string(), "alt+f4");
}
