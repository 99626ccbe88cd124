//! Authentication implementations.

mod api_key;
#[cfg(feature = "jwt")]
mod jwt;

pub use api_key::ApiKeyAuthenticator;
#[cfg(feature = "jwt")]
pub use jwt::{JwtAuthenticator, JwtConfig};
