//! Shared integration-test setup: installs the `tracing-subscriber` fmt
//! layer so a run with `RUST_LOG` set shows the spans emitted by
//! `mastership`/`replication`/`rwlock` (`spec.md` ambient logging).

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_test_writer().try_init();
}
