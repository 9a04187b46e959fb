use tracing::error;

/// Work factor used when nothing else is configured.
pub const DEFAULT_COST: u32 = 12;

pub const MIN_LEN: usize = 8;
pub const MAX_LEN: usize = 20;

pub fn hash_password(plain: &str, cost: u32) -> anyhow::Result<String> {
    bcrypt::hash(plain, cost).map_err(|e| {
        error!(error = %e, "bcrypt hash error");
        anyhow::anyhow!(e.to_string())
    })
}

/// bcrypt's own verify does the constant-time comparison.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    bcrypt::verify(plain, hash).map_err(|e| {
        error!(error = %e, "bcrypt verify error");
        anyhow::anyhow!(e.to_string())
    })
}

/// Length bound on the raw password, counted in characters.
pub fn check_length(plain: &str) -> Result<(), String> {
    let len = plain.chars().count();
    if len < MIN_LEN {
        return Err(format!("Password must be at least {MIN_LEN} characters"));
    }
    if len > MAX_LEN {
        return Err(format!("Password can not be more than {MAX_LEN} characters"));
    }
    Ok(())
}
