use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use super::error::AuthenticationError;
use super::roles::RoleResolver;
use crate::config::JwtConfig;
use crate::models::{Identity, Permission, Role};

/// Fallback lifetime for unparseable TTL settings.
pub const DEFAULT_TTL_SECONDS: i64 = 900;

/// Ten years; anything longer is treated as a typo.
const MAX_TTL_SECONDS: i64 = 3_650 * 86_400;

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
    /// Effective permissions at issue time
    pub permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_permissions: Option<Vec<Permission>>,
    pub session_id: Uuid,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.sub,
            email: self.email.clone(),
            tenant_id: self.tenant_id,
            role: self.role,
            custom_permissions: self.custom_permissions.clone(),
            session_id: self.session_id,
        }
    }
}

/// Claims for refresh tokens (long-lived). Carries no profile data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    #[serde(rename = "sub")]
    pub subject_id: Uuid,
    pub session_id: Uuid,
    /// Token ID (matches the registry record)
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Token response returned to client
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in_seconds: i64,
    #[serde(skip)]
    pub refresh_jti: Uuid,
    #[serde(skip)]
    pub refresh_expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 access/refresh token pairs under distinct secrets.
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenService {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        let service = Self::new(
            config.access_secret.expose_secret().as_bytes(),
            config.refresh_secret.expose_secret().as_bytes(),
            parse_ttl(&config.access_ttl),
            parse_ttl(&config.refresh_ttl),
        );
        tracing::info!(
            access_ttl_seconds = service.access_ttl_seconds,
            refresh_ttl_seconds = service.refresh_ttl_seconds,
            "Token service initialized with HS256 keys"
        );
        service
    }

    /// Issue a fresh access/refresh pair for `identity`.
    pub fn issue(&self, identity: &Identity) -> Result<TokenPair, anyhow::Error> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_ttl_seconds);
        let refresh_exp = now + Duration::seconds(self.refresh_ttl_seconds);

        let access_claims = AccessClaims {
            sub: identity.user_id,
            email: identity.email.clone(),
            role: identity.role,
            tenant_id: identity.tenant_id,
            permissions: RoleResolver::effective_permissions(
                identity.role,
                identity.custom_permissions.as_deref(),
            )
            .into_iter()
            .collect(),
            custom_permissions: identity.custom_permissions.clone(),
            session_id: identity.session_id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
        };

        let refresh_jti = Uuid::new_v4();
        let refresh_claims = RefreshClaims {
            subject_id: identity.user_id,
            session_id: identity.session_id,
            jti: refresh_jti,
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access_claims, &self.access_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;
        let refresh_token = encode(&header, &refresh_claims, &self.refresh_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in_seconds: self.access_ttl_seconds,
            refresh_jti,
            refresh_expires_at: refresh_exp,
        })
    }

    /// Validate and decode an access token into its full claim set.
    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, AuthenticationError> {
        decode_with(token, &self.access_decoding)
    }

    pub fn verify_access(&self, token: &str) -> Result<Identity, AuthenticationError> {
        self.decode_access(token).map(|claims| claims.identity())
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthenticationError> {
        decode_with(token, &self.refresh_decoding)
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }
}

fn decode_with<T: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
) -> Result<T, AuthenticationError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthenticationError::TokenExpired,
            _ => {
                tracing::debug!(error = %e, "Token rejected");
                AuthenticationError::TokenInvalid
            }
        })
}

/// Parse a lifetime such as `30s`, `15m`, `12h`, `7d` or a bare number of
/// seconds. Anything malformed or non-positive falls back to 900 seconds.
pub fn parse_ttl(value: &str) -> i64 {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last() {
        Some('s') => (&value[..value.len() - 1], 1),
        Some('m') => (&value[..value.len() - 1], 60),
        Some('h') => (&value[..value.len() - 1], 3_600),
        Some('d') => (&value[..value.len() - 1], 86_400),
        _ => (value, 1),
    };

    match digits.parse::<i64>() {
        Ok(n) if n > 0 => match n.checked_mul(multiplier) {
            Some(seconds) if seconds <= MAX_TTL_SECONDS => seconds,
            _ => {
                tracing::warn!(ttl = %value, "Token TTL out of range; using default");
                DEFAULT_TTL_SECONDS
            }
        },
        _ => {
            tracing::warn!(ttl = %value, "Malformed token TTL; using default");
            DEFAULT_TTL_SECONDS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS: &[u8] = b"test-access-secret-0123456789abcdef";
    const REFRESH: &[u8] = b"test-refresh-secret-0123456789abcdef";

    fn service() -> TokenService {
        TokenService::new(ACCESS, REFRESH, 900, 7 * 86_400)
    }

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "nurse@clinic.test".to_string(),
            tenant_id: Some(Uuid::new_v4()),
            role: Role::Nurse,
            custom_permissions: None,
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_issue_then_verify_round_trips_identity() {
        let svc = service();
        let identity = identity();
        let pair = svc.issue(&identity).unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in_seconds, 900);
        assert_eq!(svc.verify_access(&pair.access_token).unwrap(), identity);

        let claims = svc.decode_access(&pair.access_token).unwrap();
        let now = Utc::now().timestamp();
        assert!(claims.iat <= now && now < claims.exp);
        assert!(claims.permissions.contains(&Permission::PatientsRead));
    }

    #[test]
    fn test_refresh_claims_carry_session() {
        let svc = service();
        let identity = identity();
        let pair = svc.issue(&identity).unwrap();

        let claims = svc.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(claims.subject_id, identity.user_id);
        assert_eq!(claims.session_id, identity.session_id);
        assert_eq!(claims.jti, pair.refresh_jti);
    }

    #[test]
    fn test_tokens_are_not_interchangeable() {
        let svc = service();
        let pair = svc.issue(&identity()).unwrap();

        assert_eq!(
            svc.verify_access(&pair.refresh_token).unwrap_err(),
            AuthenticationError::TokenInvalid
        );
        assert_eq!(
            svc.verify_refresh(&pair.access_token).unwrap_err(),
            AuthenticationError::TokenInvalid
        );
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let svc = service();
        let pair = svc.issue(&identity()).unwrap();
        let mut tampered = pair.access_token.clone();
        tampered.push('x');

        assert_eq!(
            svc.verify_access(&tampered).unwrap_err(),
            AuthenticationError::TokenInvalid
        );
        assert_eq!(
            svc.verify_access("not.a.jwt").unwrap_err(),
            AuthenticationError::TokenInvalid
        );
    }

    #[test]
    fn test_expired_token_is_distinguished() {
        let identity = identity();
        let past = Utc::now() - Duration::minutes(5);
        let claims = AccessClaims {
            sub: identity.user_id,
            email: identity.email.clone(),
            role: identity.role,
            tenant_id: identity.tenant_id,
            permissions: vec![],
            custom_permissions: None,
            session_id: identity.session_id,
            jti: Uuid::new_v4(),
            iat: (past - Duration::minutes(15)).timestamp(),
            exp: past.timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(ACCESS),
        )
        .unwrap();

        assert_eq!(
            service().verify_access(&token).unwrap_err(),
            AuthenticationError::TokenExpired
        );
    }

    #[test]
    fn test_custom_permissions_travel_in_claims() {
        let svc = service();
        let mut identity = identity();
        identity.custom_permissions = Some(vec![Permission::LabRead]);
        let pair = svc.issue(&identity).unwrap();

        let claims = svc.decode_access(&pair.access_token).unwrap();
        assert_eq!(claims.permissions, vec![Permission::LabRead]);
        assert_eq!(claims.custom_permissions, Some(vec![Permission::LabRead]));
    }

    #[test]
    fn test_parse_ttl_units() {
        assert_eq!(parse_ttl("30s"), 30);
        assert_eq!(parse_ttl("15m"), 900);
        assert_eq!(parse_ttl("12h"), 43_200);
        assert_eq!(parse_ttl("7d"), 604_800);
        assert_eq!(parse_ttl("3600"), 3_600);
    }

    #[test]
    fn test_parse_ttl_falls_back() {
        assert_eq!(parse_ttl(""), DEFAULT_TTL_SECONDS);
        assert_eq!(parse_ttl("abc"), DEFAULT_TTL_SECONDS);
        assert_eq!(parse_ttl("-5m"), DEFAULT_TTL_SECONDS);
        assert_eq!(parse_ttl("0"), DEFAULT_TTL_SECONDS);
        assert_eq!(parse_ttl("10w"), DEFAULT_TTL_SECONDS);
        assert_eq!(parse_ttl("99999999999999999d"), DEFAULT_TTL_SECONDS);
    }
}
