use crate::models::Identity;
use crate::services::{
    ensure_tenant_active, AuthenticationError, CredentialStore, ServiceError, TokenService,
};

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthenticationError> {
    let value = header.ok_or(AuthenticationError::MissingToken)?.trim();
    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthenticationError::MissingToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthenticationError::MissingToken);
    }
    Ok(token)
}

/// Verify the access token and confirm the account still exists and is
/// active, along with its tenant.
pub async fn authenticate(
    tokens: &TokenService,
    store: &dyn CredentialStore,
    authorization: Option<&str>,
) -> Result<Identity, ServiceError> {
    let token = bearer_token(authorization)?;
    let identity = tokens.verify_access(token)?;

    let user = store
        .find_user_by_id(identity.user_id)
        .await?
        .ok_or(AuthenticationError::TokenInvalid)?;
    if !user.is_active {
        return Err(AuthenticationError::AccountInactive.into());
    }
    ensure_tenant_active(store, user.tenant_id).await?;

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")), Ok("abc.def"));
        assert_eq!(bearer_token(Some("bearer  abc")), Ok("abc"));
        assert_eq!(bearer_token(None), Err(AuthenticationError::MissingToken));
        assert_eq!(
            bearer_token(Some("Basic dXNlcg==")),
            Err(AuthenticationError::MissingToken)
        );
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthenticationError::MissingToken));
        assert_eq!(bearer_token(Some("Bearer")), Err(AuthenticationError::MissingToken));
    }
}
