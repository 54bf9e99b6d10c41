use bcrypt::{hash, verify};

/// Work factor for password hashing.
const BCRYPT_COST: u32 = 10;

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let password_hash = hash(password, BCRYPT_COST)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(password_hash)
}

pub fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let matches =
        verify(password, hash).map_err(|e| anyhow::anyhow!("Invalid password hash: {}", e))?;
    Ok(matches)
}
