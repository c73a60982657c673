use serde::{Deserialize, Serialize};

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Stable user identity.
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}
