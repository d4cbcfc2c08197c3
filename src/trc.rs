//! Tracing configuration and initialization.

use tracing_subscriber::{
    EnvFilter,
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

enum TrcMode {
    /// Compact, target-less lines on stderr.
    Pretty,
    /// Full `fmt` output including span enter/close events.
    Ugly,
}

pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        let maybe_env_filter =
            EnvFilter::try_from_env("KERNFS_LOG").or_else(|_| EnvFilter::try_from_default_env());

        match maybe_env_filter {
            // An explicit filter gets the verbose format.
            Ok(env_filter) => Self {
                mode: TrcMode::Ugly,
                env_filter,
            },
            Err(_) => Self {
                mode: TrcMode::Pretty,
                env_filter: EnvFilter::new("info"),
            },
        }
    }
}

impl Trc {
    pub fn init(self) -> Result<(), TryInitError> {
        match self.mode {
            TrcMode::Ugly => Self::init_ugly_mode(self.env_filter),
            TrcMode::Pretty => Self::init_pretty_mode(self.env_filter),
        }
    }

    fn init_ugly_mode(env_filter: EnvFilter) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE),
            )
            .try_init()
    }

    fn init_pretty_mode(env_filter: EnvFilter) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .without_time()
                    .compact(),
            )
            .try_init()
    }
}
