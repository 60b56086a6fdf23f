use busprobe::{BusProbeError, BusProbeResult, LinkError, ProbeOutcome};
use std::error::Error;

/// Error handling and resilience tests
#[cfg(test)]
mod error_handling_tests {
    use super::*;

    #[test]
    fn test_error_types() {
        let errors = vec![
            BusProbeError::Config { message: "Config error".to_string() },
            BusProbeError::PortUnavailable {
                port: "/dev/ttyUSB0".to_string(),
                message: "Permission denied".to_string(),
            },
            BusProbeError::Workflow("stdin closed".to_string()),
            BusProbeError::InvalidInput("Invalid input".to_string()),
            BusProbeError::Output("Output error".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty(), "Error display should not be empty");
        }

        // Errors cross await points in the CLI
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BusProbeError>();
        assert_send_sync::<LinkError>();
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: BusProbeError = io_error.into();
        assert!(matches!(error, BusProbeError::Io(_)));

        let serial_error =
            serialport::Error::new(serialport::ErrorKind::NoDevice, "device disappeared");
        let error: BusProbeError = serial_error.into();
        assert!(matches!(error, BusProbeError::Serial(_)));
        assert!(error.to_string().contains("device disappeared"));
    }

    #[test]
    fn test_result_type() {
        fn success_function() -> BusProbeResult<String> {
            Ok("success".to_string())
        }

        fn error_function() -> BusProbeResult<String> {
            Err(BusProbeError::Config {
                message: "Test error".to_string(),
            })
        }

        assert_eq!(success_function().unwrap(), "success");
        assert!(error_function()
            .unwrap_err()
            .to_string()
            .contains("Configuration error"));
    }

    #[test]
    fn test_error_chain() {
        let root_cause = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Access denied");
        let error: BusProbeError = root_cause.into();

        let mut current_error: &dyn Error = &error;
        let mut depth = 0;
        while let Some(source) = current_error.source() {
            current_error = source;
            depth += 1;
            if depth > 10 {
                break;
            }
        }

        assert!(depth > 0, "Should have at least one source error");
    }

    #[test]
    fn test_port_unavailable_names_the_port() {
        let error = BusProbeError::PortUnavailable {
            port: "COM5".to_string(),
            message: "Access is denied".to_string(),
        };

        let display = format!("{}", error);
        assert!(display.contains("COM5"));
        assert!(display.contains("Access is denied"));
        assert_ne!(display, format!("{:?}", error));
    }

    #[tokio::test]
    async fn test_async_error_propagation() {
        async fn failing_async_function() -> BusProbeResult<()> {
            Err(BusProbeError::Workflow("stdin closed before the power cycle".to_string()))
        }

        async fn calling_function() -> BusProbeResult<()> {
            failing_async_function().await?;
            Ok(())
        }

        let error = calling_function().await.unwrap_err();
        assert!(error.to_string().contains("Workflow"));
        assert!(error.to_string().contains("power cycle"));
    }

    #[test]
    fn test_link_errors_fold_into_outcomes() {
        // Link failures never surface as process errors
        let cases = vec![
            (LinkError::Timeout, "no response"),
            (LinkError::Unavailable("busy".to_string()), "cannot open port"),
            (LinkError::Exception("IllegalFunction".to_string()), "error:"),
            (LinkError::Protocol("invalid CRC".to_string()), "error:"),
            (LinkError::Io("broken pipe".to_string()), "error:"),
        ];

        for (error, expected) in cases {
            let outcome = ProbeOutcome::from_read(Err(error));
            assert!(
                outcome.to_string().starts_with(expected),
                "{} should start with {}",
                outcome,
                expected
            );
        }
    }

    #[test]
    fn test_error_size() {
        let error_size = std::mem::size_of::<BusProbeError>();
        assert!(error_size <= 128, "BusProbeError too large: {} bytes", error_size);
    }
}
