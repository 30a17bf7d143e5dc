// GNU AGPL v3 License

//! Set up the logging callback for FFMPEG to use tracing

#![allow(unsafe_code)]

use ffmpeg::sys;
use std::{
    ffi::c_void,
    mem,
    os::raw::{c_char, c_int},
    sync::atomic::{AtomicI32, Ordering::Relaxed},
};
use tracing::Level;
use vsprintf::vsprintf;

/// Most verbose FFMPEG level that is forwarded.
static MAX_LEVEL: AtomicI32 = AtomicI32::new(sys::AV_LOG_WARNING);

/// Register the logging callback with FFMPEG.
pub(crate) fn register_ffmpeg_logger(verbose: bool) {
    let max_level = if verbose {
        sys::AV_LOG_VERBOSE
    } else {
        sys::AV_LOG_WARNING
    };
    MAX_LEVEL.store(max_level, Relaxed);

    unsafe {
        sys::av_log_set_callback(Some(log_callback));
    }
}

/// The callback that forwards to tracing.
unsafe extern "C" fn log_callback(
    _class: *mut c_void,
    level: c_int,
    format: *const c_char,
    va_list: *mut sys::__va_list_tag,
) {
    // if any functionality panics, abort
    let bomb = AbortOnDrop;

    if level <= MAX_LEVEL.load(Relaxed) {
        if let Some(level) = tracing_level(level) {
            let formatted = vsprintf(format, va_list)
                .unwrap_or_else(|_| "FFMPEG: unknown error".to_string());
            emit(level, formatted.trim_end());
        }
    }

    mem::forget(bomb);
}

fn emit(level: Level, message: &str) {
    if message.is_empty() {
        return;
    }

    match level {
        Level::ERROR => tracing::error!("ffmpeg: {}", message),
        Level::WARN => tracing::warn!("ffmpeg: {}", message),
        Level::INFO => tracing::info!("ffmpeg: {}", message),
        Level::DEBUG => tracing::debug!("ffmpeg: {}", message),
        _ => tracing::trace!("ffmpeg: {}", message),
    }
}

/// Match an FFMPEG log level to a tracing level.
fn tracing_level(level: c_int) -> Option<Level> {
    match level {
        sys::AV_LOG_QUIET => None,
        l if l <= sys::AV_LOG_ERROR => Some(Level::ERROR),
        l if l <= sys::AV_LOG_WARNING => Some(Level::WARN),
        l if l <= sys::AV_LOG_INFO => Some(Level::INFO),
        l if l <= sys::AV_LOG_DEBUG => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

struct AbortOnDrop;

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        std::process::abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_by_severity() {
        assert_eq!(tracing_level(sys::AV_LOG_QUIET), None);
        assert_eq!(tracing_level(sys::AV_LOG_PANIC), Some(Level::ERROR));
        assert_eq!(tracing_level(sys::AV_LOG_FATAL), Some(Level::ERROR));
        assert_eq!(tracing_level(sys::AV_LOG_WARNING), Some(Level::WARN));
        assert_eq!(tracing_level(sys::AV_LOG_INFO), Some(Level::INFO));
        assert_eq!(tracing_level(sys::AV_LOG_VERBOSE), Some(Level::DEBUG));
        assert_eq!(tracing_level(sys::AV_LOG_TRACE), Some(Level::TRACE));
    }
}
