// db/userdb.rs
use async_trait::async_trait;
use redis::AsyncCommands;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::usermodel::User;

// Auth resolves the user on every request; a short TTL keeps that lookup
// off Postgres without holding a stale row for long.
const USER_CACHE_TTL_SECS: usize = 60;

fn user_cache_key(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

#[async_trait]
pub trait UserExt {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error> {
        if let Some(user) = self.read_cached_user(user_id).await {
            return Ok(Some(user));
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role, avatar_url, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user) = &user {
            self.cache_user(user).await;
        }
        Ok(user)
    }
}

impl DBClient {
    // Cache misses and Redis failures both fall through to Postgres.
    async fn read_cached_user(&self, user_id: Uuid) -> Option<User> {
        let redis = self.redis_client.as_ref()?;
        let mut conn = redis.as_ref().clone();
        let raw: Option<String> = conn.get(user_cache_key(user_id)).await.ok()?;
        serde_json::from_str(&raw?).ok()
    }

    async fn cache_user(&self, user: &User) {
        let Some(redis) = self.redis_client.as_ref() else {
            return;
        };
        let Ok(raw) = serde_json::to_string(user) else {
            return;
        };
        let mut conn = redis.as_ref().clone();
        let result: redis::RedisResult<()> = conn
            .set_ex(user_cache_key(user.id), raw, USER_CACHE_TTL_SECS)
            .await;
        if let Err(e) = result {
            tracing::debug!("User cache write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::usermodel::UserRole;
    use chrono::Utc;

    #[test]
    fn cache_key_is_per_user() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(user_cache_key(a), format!("user:{}", a));
        assert_ne!(user_cache_key(a), user_cache_key(b));
    }

    #[test]
    fn cached_user_survives_the_json_round_trip() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            role: UserRole::Influencer,
            avatar_url: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        };
        let raw = serde_json::to_string(&user).unwrap();
        let restored: User = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored.id, user.id);
        assert_eq!(restored.email, user.email);
        assert_eq!(restored.role, user.role);
    }
}
