use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{AdminUpgradeRequest, ProfileUpdate, UserDetail, UserUpdate};
use super::validation::{ValidatedJson, ValidatedPath};
use crate::{
    auth::{CurrentUser, ElevatedUser},
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profile/me", get(get_profile_me).patch(update_profile_me))
        .route("/profile/upgrade", post(upgrade_professional_status))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/users/:id", get(get_user).patch(update_user))
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn get_profile_me(CurrentUser(user): CurrentUser) -> Json<UserDetail> {
    Json(user.into())
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_profile_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(payload): ValidatedJson<ProfileUpdate>,
) -> ApiResult<Json<UserDetail>> {
    let updated = state
        .users
        .update_profile(user.id, &payload, OffsetDateTime::now_utc())
        .await?
        .ok_or(ApiError::NotFound { entity: "User" })?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(updated.into()))
}

#[instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn upgrade_professional_status(
    State(state): State<AppState>,
    ElevatedUser(actor): ElevatedUser,
    ValidatedJson(body): ValidatedJson<AdminUpgradeRequest>,
) -> ApiResult<Json<UserDetail>> {
    let Some(target) = state
        .users
        .set_professional_status(
            body.user_id,
            body.professional,
            actor.id,
            OffsetDateTime::now_utc(),
        )
        .await?
    else {
        warn!(target_id = %body.user_id, "upgrade target not found");
        return Err(ApiError::NotFound { entity: "User" });
    };

    info!(
        target_id = %target.id,
        actor_id = %actor.id,
        professional = target.is_professional,
        reason = body.reason.as_deref().unwrap_or_default(),
        "professional status changed"
    );
    Ok(Json(target.into()))
}

#[instrument(skip(state, _actor))]
pub async fn get_user(
    State(state): State<AppState>,
    ElevatedUser(_actor): ElevatedUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
) -> ApiResult<Json<UserDetail>> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound { entity: "User" })?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, actor, payload), fields(actor_id = %actor.id))]
pub async fn update_user(
    State(state): State<AppState>,
    ElevatedUser(actor): ElevatedUser,
    ValidatedPath(id): ValidatedPath<Uuid>,
    ValidatedJson(payload): ValidatedJson<UserUpdate>,
) -> ApiResult<Json<UserDetail>> {
    let updated = state
        .users
        .update_user(id, &payload, OffsetDateTime::now_utc())
        .await?
        .ok_or(ApiError::NotFound { entity: "User" })?;

    info!(user_id = %updated.id, role = %updated.role, "user updated by staff");
    Ok(Json(updated.into()))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        app::build_app,
        auth::{
            claims::TokenKind,
            jwt::test_tokens::{sign, sign_raw},
        },
        users::model::{User, UserRole},
    };

    struct Harness {
        state: AppState,
        app: Router,
    }

    impl Harness {
        fn new() -> Self {
            let state = AppState::fake();
            let app = build_app(state.clone());
            Self { state, app }
        }

        async fn seed(&self, nickname: &str, role: UserRole) -> User {
            let user = User::new(
                nickname,
                format!("{nickname}@example.com"),
                "hash",
                role,
                OffsetDateTime::now_utc(),
            );
            self.state.users.insert(&user).await.expect("seed user")
        }

        fn token_for(&self, user: &User) -> String {
            sign(&self.state.config.jwt, user.id, user.role, TokenKind::Access)
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(t) = token {
                req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
            }
            let req = match body {
                Some(b) => req
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(b.to_string())),
                None => req.body(Body::empty()),
            }
            .unwrap();

            let res = self.app.clone().oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = res.into_body().collect().await.unwrap().to_bytes();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }
    }

    #[tokio::test]
    async fn patch_me_applies_only_present_fields() {
        let h = Harness::new();
        let mut user = User::new(
            "jane",
            "jane@example.com",
            "hash",
            UserRole::Authenticated,
            OffsetDateTime::now_utc(),
        );
        user.first_name = Some("Jane".into());
        user.bio = Some("old".into());
        let user = h.state.users.insert(&user).await.unwrap();
        let token = h.token_for(&user);

        let (status, body) = h
            .send(
                Method::PATCH,
                "/profile/me",
                Some(&token),
                Some(json!({"location": "Lisbon", "extra_fields": {"langs": ["pt", "en"]}})),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["location"], "Lisbon");
        assert_eq!(body["extra_fields"]["langs"][1], "en");
        assert_eq!(body["first_name"], "Jane");
        assert_eq!(body["bio"], "old");
        assert_eq!(body["professional"], false);
    }

    #[tokio::test]
    async fn patch_me_with_explicit_null_clears_field() {
        let h = Harness::new();
        let user = h.seed("jane", UserRole::Authenticated).await;
        let token = h.token_for(&user);

        h.send(
            Method::PATCH,
            "/profile/me",
            Some(&token),
            Some(json!({"bio": "hello", "location": "Porto"})),
        )
        .await;
        let (status, body) = h
            .send(
                Method::PATCH,
                "/profile/me",
                Some(&token),
                Some(json!({"bio": null, "location": "Braga"})),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bio"], Value::Null);
        assert_eq!(body["location"], "Braga");
    }

    #[tokio::test]
    async fn patch_me_rejects_empty_payload_without_persisting() {
        let h = Harness::new();
        let user = h.seed("jane", UserRole::Authenticated).await;
        let token = h.token_for(&user);

        for body in [json!({}), json!({"bio": null}), json!({"nickname": "x"})] {
            let (status, err) = h
                .send(Method::PATCH, "/profile/me", Some(&token), Some(body))
                .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(err["error"], "Unprocessable Entity");
        }

        let stored = h.state.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn patch_me_malformed_json_is_a_validation_error() {
        let h = Harness::new();
        let user = h.seed("jane", UserRole::Authenticated).await;
        let token = h.token_for(&user);

        let (status, _) = h
            .send(
                Method::PATCH,
                "/profile/me",
                Some(&token),
                Some(json!({"extra_fields": "not-an-object"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn profile_requires_a_valid_token() {
        let h = Harness::new();
        let (status, _) = h.send(Method::GET, "/profile/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = h
            .send(Method::GET, "/profile/me", Some("garbage"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_without_role_claim_uses_stored_role() {
        let h = Harness::new();
        let user = h.seed("plain", UserRole::Manager).await;
        let cfg = &h.state.config.jwt;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let token = sign_raw(
            cfg,
            &json!({
                "sub": user.id,
                "iat": now,
                "exp": now + 600,
                "iss": cfg.issuer,
                "aud": cfg.audience,
                "kind": "access",
            }),
        );

        let (status, body) = h.send(Method::GET, "/profile/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "MANAGER");
    }

    #[tokio::test]
    async fn locked_account_is_turned_away() {
        let h = Harness::new();
        let mut user = User::new(
            "locked",
            "locked@example.com",
            "hash",
            UserRole::Admin,
            OffsetDateTime::now_utc(),
        );
        user.lock_account();
        let user = h.state.users.insert(&user).await.unwrap();

        let (status, _) = h
            .send(Method::GET, "/profile/me", Some(&h.token_for(&user)), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_upgrade_then_manager_clear() {
        let h = Harness::new();
        let u1 = h.seed("u1", UserRole::Authenticated).await;
        let a1 = h.seed("a1", UserRole::Admin).await;
        let m1 = h.seed("m1", UserRole::Manager).await;

        let (status, body) = h
            .send(
                Method::POST,
                "/profile/upgrade",
                Some(&h.token_for(&a1)),
                Some(json!({"user_id": u1.id, "professional": true, "reason": "verified portfolio"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["professional"], true);
        assert_eq!(body["professional_upgraded_by_id"], a1.id.to_string());
        let first_stamp = h
            .state
            .users
            .find_by_id(u1.id)
            .await
            .unwrap()
            .unwrap()
            .professional_status_updated_at
            .expect("stamped on upgrade");

        let (status, body) = h
            .send(
                Method::POST,
                "/profile/upgrade",
                Some(&h.token_for(&m1)),
                Some(json!({"user_id": u1.id, "professional": false})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["professional"], false);
        assert_eq!(body["professional_upgraded_by_id"], Value::Null);

        let stored = h.state.users.find_by_id(u1.id).await.unwrap().unwrap();
        assert!(!stored.is_professional);
        assert_eq!(stored.professional_upgraded_by_id, None);
        assert!(stored.professional_status_updated_at.unwrap() > first_stamp);
    }

    #[tokio::test]
    async fn upgrade_requires_elevated_role() {
        let h = Harness::new();
        let target = h.seed("target", UserRole::Authenticated).await;
        let caller = h.seed("caller", UserRole::Authenticated).await;

        let (status, _) = h
            .send(
                Method::POST,
                "/profile/upgrade",
                Some(&h.token_for(&caller)),
                Some(json!({"user_id": target.id, "professional": true})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let stored = h.state.users.find_by_id(target.id).await.unwrap().unwrap();
        assert!(!stored.is_professional);
        assert!(stored.professional_status_updated_at.is_none());
    }

    #[tokio::test]
    async fn stored_role_wins_over_token_claim() {
        let h = Harness::new();
        let target = h.seed("target", UserRole::Authenticated).await;
        let demoted = h.seed("demoted", UserRole::Authenticated).await;
        let stale_token = sign(
            &h.state.config.jwt,
            demoted.id,
            UserRole::Admin,
            TokenKind::Access,
        );

        let (status, _) = h
            .send(
                Method::POST,
                "/profile/upgrade",
                Some(&stale_token),
                Some(json!({"user_id": target.id, "professional": true})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn upgrade_unknown_user_is_not_found() {
        let h = Harness::new();
        let admin = h.seed("admin", UserRole::Admin).await;

        let (status, body) = h
            .send(
                Method::POST,
                "/profile/upgrade",
                Some(&h.token_for(&admin)),
                Some(json!({"user_id": Uuid::new_v4(), "professional": true})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["details"], "User not found");

        let admin_after = h.state.users.find_by_id(admin.id).await.unwrap().unwrap();
        assert_eq!(admin_after, admin);
    }

    #[tokio::test]
    async fn admin_can_read_and_update_users() {
        let h = Harness::new();
        let admin = h.seed("admin", UserRole::Admin).await;
        let target = h.seed("target", UserRole::Authenticated).await;
        h.seed("taken", UserRole::Authenticated).await;
        let token = h.token_for(&admin);

        let (status, body) = h
            .send(Method::GET, &format!("/users/{}", target.id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nickname"], "target");

        let (status, body) = h
            .send(
                Method::PATCH,
                &format!("/users/{}", target.id),
                Some(&token),
                Some(json!({"role": "MANAGER", "linkedin_profile_url": "https://linkedin.com/in/target"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "MANAGER");
        assert_eq!(body["linkedin_profile_url"], "https://linkedin.com/in/target");

        let (status, _) = h
            .send(
                Method::PATCH,
                &format!("/users/{}", target.id),
                Some(&token),
                Some(json!({"nickname": "taken"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = h
            .send(
                Method::GET,
                &format!("/users/{}", Uuid::new_v4()),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_user_id_gets_structured_validation_error() {
        let h = Harness::new();
        let admin = h.seed("admin", UserRole::Admin).await;
        let token = h.token_for(&admin);

        let (status, body) = h
            .send(Method::GET, "/users/not-a-uuid", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Unprocessable Entity");
        assert!(body["details"].as_str().unwrap().contains("UUID"));

        let (status, body) = h
            .send(
                Method::PATCH,
                "/users/42",
                Some(&token),
                Some(json!({"bio": "x"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Unprocessable Entity");
    }

    #[tokio::test]
    async fn health_is_open() {
        let h = Harness::new();
        let res = h
            .app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
