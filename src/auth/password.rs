use tokio::task::JoinError;

use crate::error::{AppError, AppResult};

/// Hash a plaintext password on the blocking pool. `cost` is the bcrypt
/// work factor (4-31).
pub async fn hash(plaintext: String, cost: u32) -> AppResult<String> {
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
        .await
        .map_err(task_failed)??;
    Ok(hashed)
}

/// Constant-time check via bcrypt. A malformed stored hash never matches.
///
/// With no stored hash (unknown or non-native account) a throwaway hash is
/// still computed at `cost`, so a miss costs the same as a wrong password.
pub async fn verify(plaintext: String, stored_hash: Option<String>, cost: u32) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || match stored_hash {
        Some(stored) => bcrypt::verify(&plaintext, &stored).unwrap_or(false),
        None => {
            let _ = bcrypt::hash(&plaintext, cost);
            false
        }
    })
    .await
    .map_err(task_failed)
}

fn task_failed(e: JoinError) -> AppError {
    AppError::Internal(format!("password task failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> String {
        v.to_string()
    }

    #[tokio::test]
    async fn hash_verifies_original_only() {
        let h = hash(s("correct horse"), 4).await.unwrap();
        assert_ne!(h, "correct horse");
        assert!(verify(s("correct horse"), Some(h.clone()), 4).await.unwrap());
        assert!(!verify(s("battery staple"), Some(h), 4).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_hashes_differently() {
        let a = hash(s("hunter2hunter2"), 4).await.unwrap();
        let b = hash(s("hunter2hunter2"), 4).await.unwrap();
        assert_ne!(a, b);
        assert!(verify(s("hunter2hunter2"), Some(a), 4).await.unwrap());
        assert!(verify(s("hunter2hunter2"), Some(b), 4).await.unwrap());
    }

    #[tokio::test]
    async fn out_of_range_cost_is_an_error() {
        assert!(hash(s("correct horse"), 2).await.is_err());
    }

    #[tokio::test]
    async fn garbage_hash_does_not_match() {
        assert!(!verify(s("anything"), Some(s("not-a-bcrypt-hash")), 4)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_hash_still_does_the_work_and_never_matches() {
        let started = std::time::Instant::now();
        assert!(!verify(s("correct horse"), None, 4).await.unwrap());
        // a bare `false` comes back in microseconds
        assert!(started.elapsed() >= std::time::Duration::from_micros(200));
    }
}
