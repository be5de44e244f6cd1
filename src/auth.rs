//! Caller identity, resolved upstream into `x-user-id` / `x-user-role` headers.

use std::str::FromStr;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::BookingError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Instructor,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

impl FromStr for Role {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "instructor" => Ok(Self::Instructor),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            _ => Err(BookingError::Unauthenticated),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i32,
    pub role: Role,
}

impl Actor {
    pub const fn new(user_id: i32, role: Role) -> Self {
        Self { user_id, role }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .ok_or(BookingError::Unauthenticated)
        };

        let user_id = header(USER_ID_HEADER)?
            .parse::<i32>()
            .map_err(|_| BookingError::Unauthenticated)?;
        let role = header(USER_ROLE_HEADER)?.parse::<Role>()?;
        Ok(Self { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<Actor, BookingError> {
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[test]
    fn only_admin_roles_are_admin() {
        assert!(Role::Admin.is_admin());
        assert!(Role::SuperAdmin.is_admin());
        assert!(!Role::User.is_admin());
        assert!(!Role::Instructor.is_admin());
    }

    #[tokio::test]
    async fn resolves_actor_from_headers() {
        let actor = extract(
            Request::builder()
                .header(USER_ID_HEADER, "42")
                .header(USER_ROLE_HEADER, "super_admin"),
        )
        .await
        .unwrap();
        assert_eq!(actor, Actor::new(42, Role::SuperAdmin));
    }

    #[tokio::test]
    async fn missing_or_unknown_identity_is_unauthenticated() {
        let missing = extract(Request::builder().header(USER_ID_HEADER, "1")).await;
        assert!(matches!(missing, Err(BookingError::Unauthenticated)));

        let unknown = extract(
            Request::builder()
                .header(USER_ID_HEADER, "1")
                .header(USER_ROLE_HEADER, "root"),
        )
        .await;
        assert!(matches!(unknown, Err(BookingError::Unauthenticated)));
    }
}
