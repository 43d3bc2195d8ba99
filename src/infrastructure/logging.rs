use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install the tracing subscriber once per process.
///
/// `RUST_LOG` wins when set; otherwise verbosity 0 logs this crate at info,
/// 1 at debug and 2+ at trace.
pub fn init_logging(verbosity: u8) {
    INIT.call_once(|| {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("xmod_inline={}", level)));

        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    });
}
