//! Cross-platform logging.
//!
//! The `log_*!` macros format their arguments once and hand the line to
//! [`emit`], which writes to the browser console on the web and to `tracing`
//! everywhere else. Native binaries call [`init`] to install a subscriber.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[cfg(target_arch = "wasm32")]
pub fn emit(level: Level, args: fmt::Arguments<'_>) {
    let line = wasm_bindgen::JsValue::from_str(&args.to_string());
    match level {
        Level::Debug => web_sys::console::debug_1(&line),
        Level::Info => web_sys::console::log_1(&line),
        Level::Warn => web_sys::console::warn_1(&line),
        Level::Error => web_sys::console::error_1(&line),
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn emit(level: Level, args: fmt::Arguments<'_>) {
    match level {
        Level::Debug => tracing::debug!("{}", args),
        Level::Info => tracing::info!("{}", args),
        Level::Warn => tracing::warn!("{}", args),
        Level::Error => tracing::error!("{}", args),
    }
}

/// Install the `tracing` subscriber, honouring `RUST_LOG`.
#[cfg(not(target_arch = "wasm32"))]
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("counselflow_client=debug"));
    // A second call (tests, embedding apps) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Error, format_args!($($arg)*))
    };
}
