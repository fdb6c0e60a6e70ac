use async_trait::async_trait;
use axum::extract::{FromRequest, RequestParts};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{unauthorized_error, Error};

const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLES_HEADER: &str = "x-user-roles";

/// The verified caller. Identity is established by the gateway in front of
/// the service and forwarded in request headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub roles: Vec<String>,
}

impl User {
    pub fn new(id: Uuid, roles: &[&str]) -> Self {
        Self {
            id,
            roles: roles.iter().map(|role| role.to_string()).collect(),
        }
    }

    pub fn new_system_user() -> Self {
        Self::new(Uuid::new_v4(), &["system"])
    }

    pub fn has_role(&self, role: String) -> bool {
        self.roles.iter().any(|x| x == &role)
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("id", |recv: &User| recv.id.to_string())
            .add_attribute_getter("roles", |recv: &User| recv.roles.clone())
            .add_method("has_role", User::has_role)
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}

#[async_trait]
impl<B: Send> FromRequest<B> for User {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let headers = req.headers();

        let id = headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(unauthorized_error)?;

        let roles = headers
            .get(USER_ROLES_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|role| !role.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { id, roles })
    }
}

#[test]
fn user_is_read_from_headers() {
    use axum::http::Request;

    let id = Uuid::new_v4();
    let request = Request::builder()
        .header(USER_ID_HEADER, id.to_string())
        .header(USER_ROLES_HEADER, "rider, driver")
        .body(())
        .unwrap();

    let user = tokio_test::block_on(User::from_request(&mut RequestParts::new(request))).unwrap();

    assert_eq!(user.id, id);
    assert!(user.has_role("rider".into()));
    assert!(user.has_role("driver".into()));
    assert!(!user.has_role("system".into()));

    let anonymous = Request::builder().body(()).unwrap();
    let err =
        tokio_test::block_on(User::from_request(&mut RequestParts::new(anonymous))).unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::Unauthorized);
}
