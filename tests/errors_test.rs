#[cfg(test)]
mod error_tests {
    use idcapture::errors::CaptureError;
    use std::error::Error;

    #[test]
    fn test_session_failure_display() {
        let error = CaptureError::SessionFailed("interrupted".to_string());
        assert!(error.to_string().contains("Camera session failed"));
        assert!(error.to_string().contains("interrupted"));
    }

    #[test]
    fn test_photo_unavailable_display() {
        let error = CaptureError::PhotoUnavailable("Display test".to_string());
        assert_eq!(format!("{}", error), "Photo unavailable: Display test");
    }

    #[test]
    fn test_debug_format_names_variant() {
        let error = CaptureError::Recognition("Debug test".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("Recognition"));
        assert!(debug_str.contains("Debug test"));
    }

    #[test]
    fn test_implements_error_trait() {
        let error = CaptureError::TorchUnavailable("no torch".to_string());
        let _error_trait: &dyn Error = &error;
        assert!(error.source().is_none());
    }

    #[test]
    fn test_only_session_errors_are_fatal() {
        let errors = vec![
            CaptureError::SessionFailed("a".to_string()),
            CaptureError::PermissionDenied("b".to_string()),
            CaptureError::PhotoUnavailable("c".to_string()),
            CaptureError::TorchUnavailable("d".to_string()),
            CaptureError::MotionUnavailable("e".to_string()),
            CaptureError::Recognition("f".to_string()),
            CaptureError::Verification("g".to_string()),
            CaptureError::Encoding("h".to_string()),
            CaptureError::Config("i".to_string()),
            CaptureError::Io("j".to_string()),
            CaptureError::FlowClosed,
        ];
        let fatal: Vec<bool> = errors.iter().map(|e| e.is_fatal()).collect();
        assert_eq!(&fatal[..2], &[true, true]);
        assert!(fatal[2..].iter().all(|f| !f));
        for error in &errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing model");
        let error: CaptureError = io.into();
        assert!(matches!(error, CaptureError::Io(ref m) if m.contains("missing model")));
    }

    #[test]
    fn test_image_error_maps_to_encoding() {
        let result = image::load_from_memory(&[0x00, 0x01, 0x02]);
        let error: CaptureError = result.unwrap_err().into();
        assert!(matches!(error, CaptureError::Encoding(_)));
    }

    #[test]
    fn test_errors_compare_by_value() {
        assert_eq!(
            CaptureError::Verification("blurry".to_string()),
            CaptureError::Verification("blurry".to_string())
        );
        assert_ne!(
            CaptureError::Verification("blurry".to_string()),
            CaptureError::Recognition("blurry".to_string())
        );
        let cloned = CaptureError::FlowClosed.clone();
        assert_eq!(cloned, CaptureError::FlowClosed);
    }
}
