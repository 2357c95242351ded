use std::sync::Once;

static INIT: Once = Once::new();

/// Initialise tracing once per test binary; level comes from `FLOWDAG_LOG`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = flowdag::logging::init_logging(None);
    });
}
