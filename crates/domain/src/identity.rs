use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;

const MAX_USER_ID_LENGTH: usize = 128;

/// The authenticated caller behind a write or a personalised listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub user_id: String,
}

impl ActorIdentity {
    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        validate_user_id(&self.user_id)
    }
}

pub fn validate_user_id(user_id: &str) -> DomainResult<()> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation("user_id is required".into()));
    }
    if trimmed.len() > MAX_USER_ID_LENGTH {
        return Err(DomainError::Validation(format!(
            "user_id must be at most {MAX_USER_ID_LENGTH} characters"
        )));
    }
    Ok(())
}
