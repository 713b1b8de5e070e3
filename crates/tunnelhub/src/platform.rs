use std::sync::Arc;
use tunnelhub_core::Terminator;

/// Platform-independent selection of the signal backend at compile time
pub fn platform_terminator() -> Arc<dyn Terminator> {
    #[cfg(unix)]
    return Arc::new(tunnelhub_unix::UnixTerminator);

    #[cfg(windows)]
    return Arc::new(tunnelhub_windows::WindowsTerminator);
}

/// Platform name for logging and diagnostics
pub fn platform_name() -> &'static str {
    #[cfg(unix)]
    return "unix";

    #[cfg(windows)]
    return "windows";
}
