use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated caller, decoded from a verified access token.
///
/// Inserted into request extensions by the authentication middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// The ID of the user the token was issued to.
    pub user_id: Uuid,
    /// The username at issue time.
    pub username: String,
    /// The effective role name at issue time.
    pub role: String,
    /// The token's unique ID.
    pub token_id: Uuid,
}
