//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--debug` selects debug output for
/// paygen crates. `--json` switches to JSON lines on stderr so stdout stays
/// free for the report.
pub fn init_tracing(json: bool, debug: bool) {
    let default = if debug {
        "info,paygen=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(debug).init();
    }
}
