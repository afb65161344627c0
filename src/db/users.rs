//! Author accounts and API token lookup

use diesel::prelude::*;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::diesel_schema::users;
use super::models::{current_timestamp, NewUser, User};
use crate::error::StorageError;

/// Longest accepted display name, in characters
pub const MAX_DISPLAY_NAME_CHARS: usize = 120;

/// Hash an API token for storage and lookup
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("sha256-{}", hex::encode(hasher.finalize()))
}

/// Generate a fresh API token
fn generate_token() -> String {
    format!("sk_{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Create an author and return it with its plaintext token.
///
/// The token is only available here; the table keeps its hash.
pub fn create_user(
    conn: &mut SqliteConnection,
    display_name: &str,
) -> Result<(User, String), StorageError> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(StorageError::InvalidInput("display name must not be empty".into()));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(StorageError::InvalidInput(format!(
            "display name exceeds {} characters",
            MAX_DISPLAY_NAME_CHARS
        )));
    }

    let id = Uuid::new_v4().to_string();
    let token = generate_token();
    let token_hash = hash_token(&token);
    let now = current_timestamp();

    diesel::insert_into(users::table)
        .values(&NewUser {
            id: &id,
            display_name,
            token_hash: &token_hash,
            created_at: &now,
        })
        .execute(conn)
        .map_err(|e| StorageError::Internal(format!("Insert failed: {}", e)))?;

    let user = get_user(conn, &id)?
        .ok_or_else(|| StorageError::Internal("Failed to retrieve created user".into()))?;
    Ok((user, token))
}

/// Get user by ID
pub fn get_user(conn: &mut SqliteConnection, id: &str) -> Result<Option<User>, StorageError> {
    users::table
        .filter(users::id.eq(id))
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

/// Resolve a plaintext API token to its user
pub fn find_by_token(
    conn: &mut SqliteConnection,
    token: &str,
) -> Result<Option<User>, StorageError> {
    users::table
        .filter(users::token_hash.eq(hash_token(token)))
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(|e| StorageError::Internal(format!("Query failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeystrokeDb;

    #[test]
    fn test_create_and_authenticate() {
        let db = KeystrokeDb::open_in_memory().unwrap();
        let (user, token) = db.with_conn(|conn| create_user(conn, "  Grace ")).unwrap();
        assert_eq!(user.display_name, "Grace");
        assert_ne!(user.token_hash, token);

        let found = db.with_conn(|conn| find_by_token(conn, &token)).unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));

        let missing = db.with_conn(|conn| find_by_token(conn, "sk_wrong")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_empty_display_name_rejected() {
        let db = KeystrokeDb::open_in_memory().unwrap();
        let result = db.with_conn(|conn| create_user(conn, "   "));
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_hash_format() {
        let hash = hash_token("token");
        assert!(hash.starts_with("sha256-"));
        assert_eq!(hash.len(), 7 + 64);
    }
}
