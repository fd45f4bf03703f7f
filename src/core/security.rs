use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;
use crate::db::types::UserRole;

#[derive(Debug, Error)]
pub(crate) enum SecurityError {
    #[error("jwt decoding failed")]
    JwtDecoding,
    #[error("unsupported jwt algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Claims minted by the identity provider. The portal never sees credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) name: String,
    pub(crate) role: UserRole,
    pub(crate) exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) iss: Option<String>,
}

pub(crate) fn verify_token(token: &str, settings: &Settings) -> Result<Claims, SecurityError> {
    let algorithm = algorithm_from_settings(settings)?;
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.required_spec_claims.insert("exp".to_string());
    validation.required_spec_claims.insert("sub".to_string());
    if let Some(issuer) = &settings.security().issuer {
        validation.set_issuer(&[issuer.as_str()]);
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.security().jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| SecurityError::JwtDecoding)
}

fn algorithm_from_settings(settings: &Settings) -> Result<Algorithm, SecurityError> {
    match settings.security().algorithm.as_str() {
        "HS256" => Ok(Algorithm::HS256),
        other => Err(SecurityError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Mints tokens the way the identity provider does; test-only.
#[cfg(test)]
pub(crate) fn issue_test_token(
    subject: &str,
    name: &str,
    role: UserRole,
    settings: &Settings,
    ttl: time::Duration,
) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: subject.to_string(),
        name: name.to_string(),
        role,
        exp: (time::OffsetDateTime::now_utc() + ttl).unix_timestamp(),
        iss: settings.security().issuer.clone(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(settings.security().jwt_secret.as_bytes()),
    )
    .expect("encode test token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn verifies_provider_token() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");

        let token = issue_test_token(
            "student-7",
            "Ada Lovelace",
            UserRole::Student,
            &settings,
            time::Duration::minutes(5),
        );
        let claims = verify_token(&token, &settings).expect("claims");

        assert_eq!(claims.sub, "student-7");
        assert_eq!(claims.name, "Ada Lovelace");
        assert_eq!(claims.role, UserRole::Student);
    }

    #[tokio::test]
    async fn rejects_expired_and_foreign_tokens() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");

        let expired = issue_test_token(
            "student-7",
            "Ada",
            UserRole::Student,
            &settings,
            time::Duration::minutes(-10),
        );
        assert!(verify_token(&expired, &settings).is_err());

        std::env::set_var("IDENTITY_JWT_SECRET", "another-provider");
        let foreign_settings = Settings::load().expect("settings");
        let foreign = issue_test_token(
            "admin-1",
            "Mallory",
            UserRole::Admin,
            &foreign_settings,
            time::Duration::minutes(5),
        );
        assert!(verify_token(&foreign, &settings).is_err());
    }
}
