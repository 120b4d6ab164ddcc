//! Client-side functionality modules of the replicated key/value service.

mod clerk;

pub use clerk::Clerk;
