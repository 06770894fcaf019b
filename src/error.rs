use snafu::Snafu;

/// The public error type for this crate.
#[derive(Debug, Snafu)]
pub struct Error(LibError);

/// The public result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The internal result type for this crate.
pub(crate) type LibResult<T> = std::result::Result<T, LibError>;

/// The internal error type for this crate.
///
/// Only load-time failures ever surface as an `Error`; runtime playback
/// failures (missing instrument, invalid loop, anti-freeze) are reported
/// through `RealtimeInterface::debug_message` and never returned.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub(crate) enum LibError {
    #[snafu(display("{}: unrecognized score format", site))]
    UnsupportedFormat { site: String },

    #[snafu(display("{}: error while reading bytes: {}", site, source))]
    Io {
        site: String,
        source: crate::byte_iter::ByteError,
    },

    #[snafu(display("{}: the score file is truncated or malformed: {}", site, description))]
    Truncated { site: String, description: String },

    #[snafu(display("{} unknown error", site))]
    Other { site: String },
}

macro_rules! site {
    () => {
        format!("{}:{}", file!(), line!())
    };
}

macro_rules! io {
    () => {
        crate::error::Io { site: site!() }
    };
}

macro_rules! truncated_s {
    () => {
        crate::error::Truncated {
            site: site!(),
            description: "[no description]",
        }
    };
    ($msg:expr) => {
        crate::error::Truncated {
            site: site!(),
            description: $msg,
        }
    };
    ($fmt:expr, $($arg:expr),+) => {
        crate::error::Truncated {
            site: site!(),
            description: format!($fmt, $($arg),+),
        }
    };
}

macro_rules! truncated {
    () => {
        return Err(truncated_s!().build())
    };
    ($msg:expr) => {
        return Err(truncated_s!($msg).build())
    };
    ($fmt:expr, $($arg:expr),+) => {
        return Err(truncated_s!($fmt, $($arg),+).build())
    };
}

macro_rules! unsupported_format {
    () => {
        return crate::error::UnsupportedFormat { site: site!() }.fail()
    };
}

// Re-exported by path so callers elsewhere in the crate can `use
// crate::error::{truncated, io, ...}` instead of relying on textual
// `#[macro_use]` scoping alone.
pub(crate) use io;
pub(crate) use site;
pub(crate) use truncated;
pub(crate) use truncated_s;
pub(crate) use unsupported_format;

#[test]
fn site_test() {
    let line = line!() + 1;
    let site = site!();
    assert!(site.contains("error.rs"));
    assert!(site.contains(format!("{}", line).as_str()));
}

#[test]
fn truncated_macro_message() {
    fn foo() -> LibResult<u64> {
        truncated!("ran out of bytes at offset {}", 12);
    }
    let result = foo();
    assert!(result.is_err());
    let message = format!("{}", result.err().unwrap());
    assert!(message.contains("ran out of bytes at offset 12"));
}

#[test]
fn unsupported_format_macro_test() {
    fn foo() -> LibResult<u64> {
        unsupported_format!();
    }
    let result = foo();
    assert!(result.is_err());
    let message = format!("{}", result.err().unwrap());
    assert!(message.contains("unrecognized score format"));
}
