// src/services/password.rs
//
// bcrypt is CPU-bound, so both directions run on the blocking pool.

use bcrypt::{hash, verify};

use crate::common::error::AppError;

#[cfg(not(test))]
const COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const COST: u32 = 4;

pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || hash(&password, COST))
        .await
        .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))??;
    Ok(hashed)
}

pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let password = password.to_owned();
    let password_hash = password_hash.to_owned();
    let valid = tokio::task::spawn_blocking(move || verify(&password, &password_hash))
        .await
        .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))??;
    Ok(valid)
}
