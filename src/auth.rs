use crate::backend::UserBackend;
use crate::error::AppError;
use crate::types::{PublicUser, User};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

pub const TOKEN_VALIDITY_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Signs and verifies HS256 tokens with one shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validity: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validity: Duration::hours(TOKEN_VALIDITY_HOURS),
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user.id,
            is_admin: user.is_admin,
            iat: now.timestamp(),
            exp: (now + self.validity).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AppError::Internal(format!("Failed to sign token: {err}")))
    }

    /// Checks signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!(%err, "Rejected token");
                AppError::Unauthorized
            })
    }
}

pub fn require_admin(claims: &Claims) -> Result<(), AppError> {
    match claims.is_admin {
        true => Ok(()),
        false => Err(AppError::Forbidden),
    }
}

/// Hashes a password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Internal(format!("Failed to hash password: {err}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<(), AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|err| AppError::Internal(format!("Invalid password hash: {err}")))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|err| {
            tracing::trace!("Password verification failed: {}", err);
            AppError::Unauthorized
        })
}

/// Looks the account up and issues a token when the password matches. Unknown
/// accounts and wrong passwords are indistinguishable to the caller.
pub fn authenticate<T: UserBackend>(
    backend: &T,
    issuer: &TokenIssuer,
    username: &str,
    password: &str,
) -> Result<LoginResponse, AppError> {
    let Some(user) = backend.user_by_username(username)? else {
        info!(username, "Login attempt for unknown user");
        return Err(AppError::Unauthorized);
    };

    if let Err(err) = verify_password(password, &user.password_hash) {
        info!(username, "Login attempt with wrong password");
        return Err(err);
    }

    info!(username, "Login successful");
    Ok(LoginResponse {
        token: issuer.issue(&user)?,
        user: PublicUser::from(&user),
    })
}

/// Creates the account, replacing any account with the same name.
pub fn create_user<T: UserBackend>(
    backend: &T,
    username: &str,
    password: &str,
    is_admin: bool,
) -> Result<User, AppError> {
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: hash_password(password)?,
        is_admin,
    };
    Ok(backend.replace_user(user)?)
}
