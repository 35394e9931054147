//! Caller identity supplied by the auth layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is calling, on behalf of which shop. Trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: Uuid,
    pub actor_user_id: Uuid,
    pub role: String,
}

impl RequestContext {
    pub fn new(tenant_id: Uuid, actor_user_id: Uuid, role: impl Into<String>) -> Self {
        Self {
            tenant_id,
            actor_user_id,
            role: role.into(),
        }
    }
}
