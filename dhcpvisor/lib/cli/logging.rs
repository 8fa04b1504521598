use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The log level used when `RUST_LOG` is not set, given how many times `-v` was passed.
pub fn default_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `verbose`. Output goes to stderr, since the lease hook
/// answers the service on stdout.
pub fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose)));

    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_maps_to_level() {
        assert_eq!(default_log_level(0), "info");
        assert_eq!(default_log_level(1), "debug");
        assert_eq!(default_log_level(2), "trace");
        assert_eq!(default_log_level(9), "trace");
    }
}
