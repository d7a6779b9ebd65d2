//! Authentication module
//!
//! Session-cookie authentication: bcrypt credential hashing, HS256 session
//! tokens, the session cookie, attempt rate limiting and the request guard.

mod cookies;
mod jwt;
mod middleware;
mod password;
mod rate_limit;

pub use cookies::{SessionCookies, SESSION_COOKIE};
pub use jwt::{Claims, Identity, JwtKeys, TokenService, TOKEN_ALGORITHM};
pub use middleware::{authenticate, require_auth, AuthUser};
pub use password::{CredentialHasher, DEFAULT_COST};
pub use rate_limit::{
    client_ip, credential_identifier, enforce, format_reset_time, ClientIp, InMemoryRateLimiter,
    RateLimitDecision, RateLimitPolicy, RateLimiter, RedisRateLimiter, DEFAULT_SWEEP_PROBABILITY,
};
