// src/middleware/rbac.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

use crate::{
    common::error::AppError,
    middleware::auth::AuthenticatedUser,
    models::auth::UserRole,
};

/// Define quais papéis podem passar pelo guardião.
pub trait RoleDef: Send + Sync + 'static {
    fn allows(role: UserRole) -> bool;
}

/// Extrator que barra a requisição quando o papel da sessão não é aceito.
pub struct RequireRole<T>(pub AuthenticatedUser, pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequireRole<T>
where
    T: RoleDef,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !T::allows(user.role) {
            tracing::warn!(user_id = %user.id, role = ?user.role, "acesso negado por papel");
            return Err(AppError::Forbidden);
        }

        Ok(RequireRole(user, PhantomData))
    }
}

// ---
// PAPÉIS
// ---

pub struct AdminOnly;
impl RoleDef for AdminOnly {
    fn allows(role: UserRole) -> bool {
        role == UserRole::Admin
    }
}

pub struct BackOffice;
impl RoleDef for BackOffice {
    fn allows(role: UserRole) -> bool {
        role.is_back_office()
    }
}

pub struct ClientOnly;
impl RoleDef for ClientOnly {
    fn allows(role: UserRole) -> bool {
        role == UserRole::Client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_office_roles() {
        assert!(BackOffice::allows(UserRole::Admin));
        assert!(BackOffice::allows(UserRole::Staff));
        assert!(!BackOffice::allows(UserRole::Client));
        assert!(!AdminOnly::allows(UserRole::Staff));
        assert!(ClientOnly::allows(UserRole::Client));
    }
}
