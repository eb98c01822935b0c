use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json,
};

use crate::adapter::driver::rest_api::ApiError;
use crate::domain::model::{Actor, ActorId, Role};

/// アクターIDを運ぶヘッダー（認証コラボレーターが検証済みの値を設定する）
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// アクターのロールを運ぶヘッダー（customer | admin）
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// リクエストヘッダーから取り出した検証済みアクター
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_value(parts, ACTOR_ID_HEADER)?;
        let id = ActorId::from_string(id)
            .map_err(|_| unauthorized(format!("{}がUUID形式ではありません", ACTOR_ID_HEADER)))?;

        let role = header_value(parts, ACTOR_ROLE_HEADER)?;
        let role = Role::from_string(role).map_err(|err| unauthorized(err.to_string()))?;

        Ok(Self(Actor::new(id, role)))
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, (StatusCode, Json<ApiError>)> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| unauthorized(format!("{}ヘッダーがありません", name)))
}

fn unauthorized(message: String) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError {
            error: message,
            code: "UNAUTHORIZED".to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use uuid::Uuid;

    async fn extract(request: Request<()>) -> Result<AuthenticatedActor, (StatusCode, Json<ApiError>)> {
        let (mut parts, _) = request.into_parts();
        AuthenticatedActor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_extracts_admin_actor() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, id.to_string())
            .header(ACTOR_ROLE_HEADER, "admin")
            .body(())
            .unwrap();

        let AuthenticatedActor(actor) = extract(request).await.unwrap();
        assert_eq!(actor.id().as_uuid(), id);
        assert!(actor.is_admin());
    }

    #[tokio::test]
    async fn test_missing_role_is_unauthorized() {
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, Uuid::new_v4().to_string())
            .body(())
            .unwrap();

        let (status, Json(error)) = extract(request).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error.code, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_malformed_actor_id_is_unauthorized() {
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, "not-a-uuid")
            .header(ACTOR_ROLE_HEADER, "customer")
            .body(())
            .unwrap();

        let (status, _) = extract(request).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_role_is_unauthorized() {
        let request = Request::builder()
            .header(ACTOR_ID_HEADER, Uuid::new_v4().to_string())
            .header(ACTOR_ROLE_HEADER, "Admin")
            .body(())
            .unwrap();

        let (status, _) = extract(request).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
