//! Client library for the SexyGuard backend: bearer-token session handling, a REST client with a
//! short-lived response cache, and an optional realtime database integration.

pub mod error;
pub mod config;
pub mod token;
pub mod client;
pub mod realtime;
pub mod session;
pub mod cli;

pub use client::{ApiClient, ApiOutcome, RequestOptions};
pub use config::{ClientConfig, RealtimeSettings};
pub use error::{ApiError, ClientError, ClientResult, normalize_error};
pub use session::{Session, SessionBuilder};
pub use token::{TokenStore, TokenStorage};

// Test-only printing helper: expands to eprintln! in test/debug builds and is a no-op otherwise.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
