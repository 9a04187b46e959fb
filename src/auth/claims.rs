use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which secret and TTL a token is signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload shared by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid, // user ID
    pub iat: i64,  // issued at (unix seconds)
    pub exp: i64,  // expires at (unix seconds)
    pub jti: Uuid, // makes tokens minted in the same second distinct
}
