use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use anyhow::Context;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::config::JwtConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token or bad signature")]
    MalformedOrBadSignature,
    #[error("token expired")]
    Expired,
}

/// HS256 signing and verification keys plus the token lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            ttl: Duration::seconds(cfg.ttl_seconds),
        }
    }

    pub fn sign(&self, user_id: i64, email: &str) -> anyhow::Result<String> {
        self.sign_with_ttl(user_id, email, self.ttl)
    }

    pub fn sign_with_ttl(&self, user_id: i64, email: &str, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now
            .checked_add(ttl)
            .context("token expiry out of range")?;
        let claims = Claims {
            user_id,
            email: email.to_string(),
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::MalformedOrBadSignature,
            }
        })?;
        debug!(user_id = data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            ttl_seconds: 24 * 60 * 60,
        })
    }

    #[test]
    fn sign_and_verify_token() {
        let keys = make_keys("dev-secret");
        let token = keys.sign(42, "a@x.com").expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn claims_use_camel_case_keys() {
        let keys = make_keys("dev-secret");
        let token = keys.sign(1, "a@x.com").expect("sign");
        let claims = keys.verify(&token).unwrap();
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn expired_token_is_rejected_as_expired() {
        let keys = make_keys("dev-secret");
        let token = keys
            .sign_with_ttl(1, "a@x.com", Duration::seconds(-5))
            .expect("sign");
        assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn short_lived_token_is_valid_until_it_elapses() {
        let keys = make_keys("dev-secret");
        let token = keys
            .sign_with_ttl(1, "a@x.com", Duration::seconds(1))
            .expect("sign");
        assert!(keys.verify(&token).is_ok());
        std::thread::sleep(std::time::Duration::from_millis(2100));
        assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn out_of_range_ttl_is_an_error() {
        let keys = make_keys("dev-secret");
        let err = keys
            .sign_with_ttl(1, "a@x.com", Duration::seconds(8_640_000_000_000))
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn wrong_secret_is_bad_signature() {
        let token = make_keys("secret-a").sign(1, "a@x.com").expect("sign");
        let err = make_keys("secret-b").verify(&token).unwrap_err();
        assert_eq!(err, TokenError::MalformedOrBadSignature);
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = make_keys("dev-secret");
        assert_eq!(
            keys.verify("not.a.jwt").unwrap_err(),
            TokenError::MalformedOrBadSignature
        );
        assert_eq!(
            keys.verify("").unwrap_err(),
            TokenError::MalformedOrBadSignature
        );
    }
}
