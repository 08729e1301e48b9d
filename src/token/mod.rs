//! Token persistence for the session bearer token.
//! Every backend exposes the same `TokenStore` capability so callers can swap them freely.

mod store;
mod memory;
mod local;
mod cookie;
mod accessor;

pub use store::{TokenStore, TokenStorage, build_token_store};
pub use memory::MemoryTokenStore;
pub use local::LocalTokenStore;
pub use cookie::CookieTokenStore;
pub use accessor::FnTokenStore;
