// src/services/auth.rs

use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserRepository,
    middleware::auth::AuthenticatedUser,
    models::auth::{AuthResponse, Claims, CreateStaffPayload, User, UserRole},
};

const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    jwt_secret: String,
    pool: PgPool,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, jwt_secret: String, pool: PgPool) -> Self {
        Self { user_repo, jwt_secret, pool }
    }

    pub async fn login_user(&self, email: &str, password: &str) -> Result<AuthResponse, AppError> {
        let user = self
            .user_repo
            .find_by_email(&self.pool, email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password_clone = password.to_owned();
        let password_hash_clone = user.password_hash.clone();

        // bcrypt é caro; roda fora do executor async
        let is_password_valid = tokio::task::spawn_blocking(move || verify(&password_clone, &password_hash_clone))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid {
            return Err(AppError::InvalidCredentials);
        }

        let token = encode_token(&self.jwt_secret, &user)?;
        Ok(AuthResponse { token, role: user.role })
    }

    /// Só confere assinatura e validade. O papel vem das claims.
    pub fn validate_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        decode_token(&self.jwt_secret, token)
    }

    pub async fn find_user(&self, id: Uuid) -> Result<User, AppError> {
        self.user_repo.find_by_id(id).await?.ok_or(AppError::UserNotFound)
    }

    pub async fn list_team(&self) -> Result<Vec<User>, AppError> {
        self.user_repo.list_back_office().await
    }

    pub async fn create_staff(&self, payload: &CreateStaffPayload) -> Result<User, AppError> {
        // Clientes nascem só pela confirmação do checkout
        if !payload.role.is_back_office() {
            return Err(AppError::Forbidden);
        }
        let hashed = hash_password(payload.password.clone()).await?;
        self.user_repo
            .create_user(&self.pool, &payload.email, &hashed, payload.role)
            .await
    }

    pub async fn change_password(&self, user_id: Uuid, current: &str, new_password: &str) -> Result<(), AppError> {
        let user = self.find_user(user_id).await?;

        let current = current.to_owned();
        let stored = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify(&current, &stored))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;
        if !matches {
            return Err(AppError::InvalidCredentials);
        }

        let hashed = hash_password(new_password.to_owned()).await?;
        self.user_repo.update_password(&self.pool, user.id, &hashed).await
    }

    /// Cria o admin inicial quando ainda não existe ninguém com esse e-mail.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<(), AppError> {
        if self.user_repo.find_by_email(&self.pool, email).await?.is_some() {
            return Ok(());
        }

        let hashed = hash_password(password.to_owned()).await?;
        let admin = self
            .user_repo
            .create_user(&self.pool, email, &hashed, UserRole::Admin)
            .await?;
        tracing::info!("👤 Admin inicial criado: {}", admin.email);
        Ok(())
    }
}

pub(crate) async fn hash_password(password: String) -> Result<String, AppError> {
    let hashed = tokio::task::spawn_blocking(move || hash(&password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;
    Ok(hashed)
}

fn encode_token(secret: &str, user: &User) -> Result<String, AppError> {
    let now = Utc::now();
    let expires_at = now + chrono::Duration::days(TOKEN_TTL_DAYS);

    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))?)
}

fn decode_token(secret: &str, token: &str) -> Result<AuthenticatedUser, AppError> {
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &Validation::default())
        .map_err(|_| AppError::InvalidToken)?;

    Ok(AuthenticatedUser {
        id: data.claims.sub,
        email: data.claims.email,
        role: data.claims.role,
    })
}
