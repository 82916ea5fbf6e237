use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{TokenGenerator, TokenKind, parse_token};
use crate::error::{Error, Result};
use crate::store::{SqliteStore, service_accounts, tokens, users};
use crate::types::{Caller, ServiceAccountCaller, Token, UserCaller};

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

/// Who a new token acts as.
#[derive(Debug, Clone, Copy)]
pub enum TokenSubject<'a> {
    User(&'a str),
    ServiceAccount(&'a str),
}

/// Builds a token row and its raw value. The raw value is never stored.
pub fn issue_token(
    generator: &TokenGenerator,
    subject: TokenSubject<'_>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(Token, String)> {
    let (kind, user_id, service_account_id) = match subject {
        TokenSubject::User(id) => (TokenKind::User, Some(id.to_string()), None),
        TokenSubject::ServiceAccount(id) => (TokenKind::ServiceAccount, None, Some(id.to_string())),
    };
    let generated = generator.generate(kind)?;

    let token = Token {
        id: Uuid::new_v4().to_string(),
        token_hash: generated.hash,
        token_lookup: generated.lookup,
        user_id,
        service_account_id,
        created_at: Utc::now(),
        expires_at,
        last_used_at: None,
    };
    Ok((token, generated.raw))
}

/// Validates a raw token against the store and resolves the caller it
/// belongs to.
pub async fn validate_token(
    store: &SqliteStore,
    generator: &TokenGenerator,
    raw_token: &str,
) -> std::result::Result<Caller, TokenValidationError> {
    let parsed = parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = {
        let tx = store.read().await.map_err(internal)?;
        tokens::get_by_lookup(&tx, parsed.lookup)
            .map_err(internal)?
            .ok_or(TokenValidationError::InvalidToken)?
    };

    let stored_kind = if token.service_account_id.is_some() {
        TokenKind::ServiceAccount
    } else {
        TokenKind::User
    };
    if stored_kind != parsed.kind {
        return Err(TokenValidationError::InvalidToken);
    }

    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(internal)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if let Some(expires_at) = &token.expires_at {
        if expires_at < &Utc::now() {
            return Err(TokenValidationError::TokenExpired);
        }
    }

    let tx = store.begin().await.map_err(internal)?;
    let caller = resolve_caller(&tx, &token)
        .map_err(internal)?
        .ok_or(TokenValidationError::InvalidToken)?;

    if let Err(e) = tokens::touch_last_used(&tx, &token.id).and_then(|()| tx.commit()) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(caller)
}

fn resolve_caller(conn: &rusqlite::Connection, token: &Token) -> Result<Option<Caller>> {
    match (&token.user_id, &token.service_account_id) {
        (Some(user_id), None) => Ok(users::get(conn, user_id)?.map(|user| Caller::User(UserCaller { user }))),
        (None, Some(account_id)) => Ok(service_accounts::get(conn, account_id)?
            .map(|service_account| Caller::ServiceAccount(ServiceAccountCaller { service_account }))),
        _ => Err(Error::internal(format!("token {} has no single subject", token.id))),
    }
}

fn internal(e: Error) -> TokenValidationError {
    tracing::error!("Token validation failed: {e}");
    TokenValidationError::InternalError
}

/// Extracts a bearer token from the Authorization header.
/// Returns None if no auth header is present.
/// Returns Err if the auth scheme is unsupported.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> std::result::Result<Option<String>, TokenValidationError> {
    match auth_header {
        Some(header) => header
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim().to_string()))
            .ok_or(TokenValidationError::InvalidScheme),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{group, store};
    use crate::types::{ServiceAccount, User};

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(None).unwrap(), None);
        assert_eq!(
            extract_token_from_header(Some("Bearer cairn_abc_def")).unwrap(),
            Some("cairn_abc_def".to_string())
        );
        assert!(matches!(
            extract_token_from_header(Some("Basic eC10b2tlbjpzZWNyZXQ=")),
            Err(TokenValidationError::InvalidScheme)
        ));
    }

    #[tokio::test]
    async fn test_validate_token_resolves_user() {
        let store = store().await;
        let generator = TokenGenerator::new();
        let user = User {
            id: "u-1".to_string(),
            username: "alice".to_string(),
            admin: false,
            created_at: Utc::now(),
        };

        let raw = {
            let tx = store.begin().await.unwrap();
            users::insert(&tx, &user).unwrap();
            let (token, raw) = issue_token(&generator, TokenSubject::User(&user.id), None).unwrap();
            tokens::insert(&tx, &token).unwrap();
            tx.commit().unwrap();
            raw
        };

        let caller = validate_token(&store, &generator, &raw).await.unwrap();
        assert_eq!(caller.subject(), "alice");

        let tampered = format!("{}x", &raw[..raw.len() - 1]);
        assert!(matches!(
            validate_token(&store, &generator, &tampered).await,
            Err(TokenValidationError::InvalidToken)
        ));

        let wrong_kind = raw.replacen("cairn_u_", "cairn_s_", 1);
        assert!(matches!(
            validate_token(&store, &generator, &wrong_kind).await,
            Err(TokenValidationError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let store = store().await;
        let generator = TokenGenerator::new();
        let user = User {
            id: "u-1".to_string(),
            username: "alice".to_string(),
            admin: false,
            created_at: Utc::now(),
        };

        let raw = {
            let tx = store.begin().await.unwrap();
            users::insert(&tx, &user).unwrap();
            let expired = Utc::now() - chrono::Duration::hours(1);
            let (token, raw) =
                issue_token(&generator, TokenSubject::User(&user.id), Some(expired)).unwrap();
            tokens::insert(&tx, &token).unwrap();
            tx.commit().unwrap();
            raw
        };

        assert!(matches!(
            validate_token(&store, &generator, &raw).await,
            Err(TokenValidationError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_validate_token_resolves_service_account() {
        let store = store().await;
        let generator = TokenGenerator::new();

        let raw = {
            let tx = store.begin().await.unwrap();
            let acme = group(&tx, "acme", None);
            let account = ServiceAccount {
                id: "sa-1".to_string(),
                name: "ci".to_string(),
                group_id: acme.id.clone(),
                resource_path: "acme/ci".to_string(),
                created_at: Utc::now(),
            };
            service_accounts::insert(&tx, &account).unwrap();
            let (token, raw) =
                issue_token(&generator, TokenSubject::ServiceAccount(&account.id), None).unwrap();
            tokens::insert(&tx, &token).unwrap();
            tx.commit().unwrap();
            raw
        };

        assert!(raw.starts_with("cairn_s_"));
        let caller = validate_token(&store, &generator, &raw).await.unwrap();
        assert_eq!(caller.subject(), "service-account:acme/ci");
        assert!(!caller.is_unrestricted());
    }
}
