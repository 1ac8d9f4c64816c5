use axum::http::{header, HeaderMap};
use log::warn;

use crate::error::RosterSyncError;
use crate::model::Caller;
use crate::store::RemoteStore;

/// Pull the bearer token out of an `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Resolve the caller through the store's own user system and require the
/// admin role. Runs before any collection is read.
pub async fn require_admin<S: RemoteStore + ?Sized>(
    store: &S,
    headers: &HeaderMap,
) -> Result<Caller, RosterSyncError> {
    let token = bearer_token(headers).ok_or(RosterSyncError::Unauthorized)?;

    let caller = match store.current_user(token).await {
        Ok(caller) => caller,
        Err(RosterSyncError::Transport { status: 401 | 403, .. }) => {
            return Err(RosterSyncError::Unauthorized)
        }
        Err(err) => return Err(err),
    };

    if !caller.is_admin() {
        warn!("Rejected non-admin caller {}", caller.email);
        return Err(RosterSyncError::Forbidden(caller.email));
    }
    Ok(caller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_user("admin-token", Caller::new("boss@example.com", "admin"));
        store.add_user("user-token", Caller::new("ana@example.com", "user"));
        store
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_admin_is_accepted() {
        let caller = require_admin(&store(), &headers("Bearer admin-token")).await.unwrap();
        assert_eq!(caller.email, "boss@example.com");
    }

    #[tokio::test]
    async fn test_missing_and_unknown_tokens_are_unauthorized() {
        let store = store();
        assert!(matches!(
            require_admin(&store, &HeaderMap::new()).await,
            Err(RosterSyncError::Unauthorized)
        ));
        assert!(matches!(
            require_admin(&store, &headers("Bearer forged")).await,
            Err(RosterSyncError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_non_admin_is_forbidden_before_any_read() {
        let store = store();
        let err = require_admin(&store, &headers("Bearer user-token")).await.unwrap_err();
        assert!(matches!(err, RosterSyncError::Forbidden(email) if email == "ana@example.com"));
        assert_eq!(store.list_calls(), 0);
    }
}
