//! Merchant login management.

use voice_confirm_server::db::PgUserRepository;
use voice_confirm_server::services::auth::AuthService;

use super::{CommandError, connect};

/// Create a login with the same email and password rules as the
/// registration endpoint. Returns the new user's id.
pub async fn create(email: &str, password: &str) -> Result<i64, CommandError> {
    let pool = connect().await?;
    let users = PgUserRepository::new(pool);

    let user = AuthService::new(&users).register(email, password).await?;
    Ok(user.id.as_i64())
}
