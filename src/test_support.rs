use std::sync::LazyLock;

use tracing_subscriber::fmt::format::FmtSpan;

static TRACING: LazyLock<()> = LazyLock::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    LazyLock::force(&TRACING);
}
