use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: &'static str,
    pub role: Role,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("{0} is not allowed to view the dashboard")]
    Forbidden(&'static str),
}

static ACCOUNTS: [(&str, &str, Role); 2] = [
    ("admin", "admin123", Role::Admin),
    ("cliente", "cliente123", Role::Client),
];

pub fn login(username: &str, password: &str) -> Result<Account, AuthError> {
    ACCOUNTS
        .iter()
        .find(|(name, secret, _)| *name == username && *secret == password)
        .map(|(name, _, role)| Account {
            username: *name,
            role: *role,
        })
        .ok_or(AuthError::InvalidCredentials)
}

pub fn require_admin(username: &str, password: &str) -> Result<Account, AuthError> {
    let account = login(username, password)?;
    match account.role {
        Role::Admin => Ok(account),
        Role::Client => Err(AuthError::Forbidden(account.username)),
    }
}
