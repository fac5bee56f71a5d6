//! Identity Provider
//!
//! Resolves the identity a connection announces. Accounts and login belong to
//! the portal; the chat core either trusts the announced fields or verifies a
//! portal-issued HS256 token.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::{IdentityMode, IdentitySettings};
use crate::domain::{Identity, SYSTEM_IDENTITY_ID};
use crate::shared::error::AppError;

/// What a client presents when identifying.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaim {
    pub token: Option<String>,
    #[serde(alias = "userId")]
    pub id: Option<String>,
    #[serde(alias = "fullName")]
    pub name: Option<String>,
    pub role: Option<String>,
    pub avatar: Option<String>,
}

/// Claims carried by portal tokens.
#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    name: String,
    role: Option<String>,
    avatar: Option<String>,
    #[allow(dead_code)]
    exp: usize,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, claim: &IdentityClaim) -> Result<Identity, AppError>;
}

/// Accepts the identity as announced, normalizing role and avatar.
#[derive(Debug, Default)]
pub struct TrustedIdentityProvider;

#[async_trait]
impl IdentityProvider for TrustedIdentityProvider {
    async fn resolve(&self, claim: &IdentityClaim) -> Result<Identity, AppError> {
        let id = claim
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation("identity: id is required".into()))?;
        if id.eq_ignore_ascii_case(SYSTEM_IDENTITY_ID) {
            return Err(AppError::Validation("identity: id is reserved".into()));
        }
        let name = claim
            .name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation("identity: name is required".into()))?;

        Ok(Identity::new(
            id,
            name,
            claim.role.as_deref(),
            claim.avatar.clone(),
        ))
    }
}

/// Verifies portal-issued tokens. Announced fields other than the avatar are
/// ignored in favour of the token's claims.
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve(&self, claim: &IdentityClaim) -> Result<Identity, AppError> {
        let token = claim
            .token
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("A token is required to identify".into()))?;

        let data = decode::<TokenClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected identity token");
            AppError::Unauthorized("Invalid or expired token".into())
        })?;
        let claims = data.claims;

        Ok(Identity::new(
            claims.sub,
            claims.name,
            claims.role.as_deref(),
            claims.avatar.or_else(|| claim.avatar.clone()),
        ))
    }
}

/// Build the provider selected in settings.
pub fn create_identity_provider(settings: &IdentitySettings) -> Box<dyn IdentityProvider> {
    match settings.mode {
        IdentityMode::Trusted => Box::new(TrustedIdentityProvider),
        IdentityMode::Jwt => Box::new(JwtIdentityProvider::new(&settings.jwt_secret)),
    }
}
