//! Logging bootstrap smoke tests.

#[cfg(test)]
mod tests {
    use edge_telemetry::{init_telemetry, TelemetryConfig};

    #[test]
    fn test_init_telemetry_once() {
        let mut config = TelemetryConfig::for_service("test");
        config.console_output = false;
        assert_eq!(config.service_name, "edge-test");

        // First install wins; a second install reports an error instead
        // of panicking.
        let first = init_telemetry(&config);
        assert!(first.is_ok());
        let second = init_telemetry(&config);
        assert!(second.is_err());
    }
}
