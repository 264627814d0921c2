//! Actor context and permission gate.
//!
//! Authentication happens upstream. The authenticated actor reaches this
//! service as the `x-actor-id` / `x-actor-type` header pair; routes that
//! mutate state additionally pass through a [`PermissionGate`].

use crate::errors::ServiceError;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::Arc};
use tracing::{debug, warn};
use utoipa::ToSchema;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_TYPE_HEADER: &str = "x-actor-type";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ActorType {
    User,
    Customer,
}

/// Authenticated caller as forwarded by the upstream gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActorContext {
    pub actor_id: i32,
    pub actor_type: ActorType,
}

impl ActorContext {
    pub fn user(actor_id: i32) -> Self {
        Self {
            actor_id,
            actor_type: ActorType::User,
        }
    }

    pub fn customer(actor_id: i32) -> Self {
        Self {
            actor_id,
            actor_type: ActorType::Customer,
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ServiceError> {
        let raw_id = headers
            .get(ACTOR_ID_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized("missing x-actor-id header".to_string()))?
            .to_str()
            .map_err(|_| ServiceError::Unauthorized("malformed x-actor-id header".to_string()))?;
        let actor_id = raw_id
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ServiceError::Unauthorized("malformed x-actor-id header".to_string()))?;

        let actor_type = match headers.get(ACTOR_TYPE_HEADER) {
            None => ActorType::User,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| ActorType::from_str(v.trim()).ok())
                .ok_or_else(|| {
                    ServiceError::Unauthorized("x-actor-type must be user or customer".to_string())
                })?,
        };

        Ok(Self {
            actor_id,
            actor_type,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<ActorContext>() {
            return Ok(*actor);
        }
        ActorContext::from_headers(&parts.headers)
    }
}

/// Answers whether an actor may perform `action` on `resource`.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn has_permission(&self, actor: &ActorContext, action: &str, resource: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct AllowAllPermissions;

#[async_trait]
impl PermissionGate for AllowAllPermissions {
    async fn has_permission(&self, _actor: &ActorContext, _action: &str, _resource: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Grant {
    actor_type: Option<ActorType>,
    actor_id: Option<i32>,
    action: Option<String>,
    resource: Option<String>,
}

impl Grant {
    fn parse(raw: &str) -> Result<Self, ServiceError> {
        let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
        let [actor_type, actor_id, action, resource] = parts.as_slice() else {
            return Err(ServiceError::ValidationError(format!(
                "permission grant '{}' must look like <actor_type>:<actor_id>:<action>:<resource>",
                raw
            )));
        };

        let invalid = || ServiceError::ValidationError(format!("invalid permission grant '{}'", raw));
        let wildcard = |s: &str| s == "*";

        Ok(Self {
            actor_type: if wildcard(actor_type) {
                None
            } else {
                Some(ActorType::from_str(actor_type).map_err(|_| invalid())?)
            },
            actor_id: if wildcard(actor_id) {
                None
            } else {
                Some(actor_id.parse().map_err(|_| invalid())?)
            },
            action: (!wildcard(action)).then(|| action.to_string()),
            resource: (!wildcard(resource)).then(|| resource.to_string()),
        })
    }

    fn matches(&self, actor: &ActorContext, action: &str, resource: &str) -> bool {
        self.actor_type.map_or(true, |t| t == actor.actor_type)
            && self.actor_id.map_or(true, |id| id == actor.actor_id)
            && self.action.as_deref().map_or(true, |a| a == action)
            && self.resource.as_deref().map_or(true, |r| r == resource)
    }
}

/// Permission gate backed by a fixed list of grants from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionGate {
    grants: Vec<Grant>,
}

impl StaticPermissionGate {
    pub fn from_grants<I, T>(grants: I) -> Result<Self, ServiceError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let grants = grants
            .into_iter()
            .map(|g| Grant::parse(g.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { grants })
    }
}

#[async_trait]
impl PermissionGate for StaticPermissionGate {
    async fn has_permission(&self, actor: &ActorContext, action: &str, resource: &str) -> bool {
        self.grants
            .iter()
            .any(|grant| grant.matches(actor, action, resource))
    }
}

/// Builds the gate described by configuration.
pub fn permission_gate_from_config(
    config: &crate::config::AppConfig,
) -> Result<Arc<dyn PermissionGate>, ServiceError> {
    if config.permissions_allow_all {
        Ok(Arc::new(AllowAllPermissions))
    } else {
        Ok(Arc::new(StaticPermissionGate::from_grants(
            &config.permission_grants,
        )?))
    }
}

#[derive(Clone)]
pub struct PermissionRequirement {
    gate: Arc<dyn PermissionGate>,
    action: &'static str,
    resource: &'static str,
}

/// Resolves the actor from headers and stores it for handlers downstream.
pub async fn actor_middleware(mut request: Request, next: Next) -> Response {
    match ActorContext::from_headers(request.headers()) {
        Ok(actor) => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

pub async fn permission_middleware(
    State(requirement): State<PermissionRequirement>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let actor = request
        .extensions()
        .get::<ActorContext>()
        .copied()
        .ok_or_else(|| ServiceError::Unauthorized("missing actor".to_string()))?;

    if !requirement
        .gate
        .has_permission(&actor, requirement.action, requirement.resource)
        .await
    {
        warn!(
            actor_id = actor.actor_id,
            actor_type = %actor.actor_type,
            action = requirement.action,
            resource = requirement.resource,
            "permission denied"
        );
        return Err(ServiceError::Forbidden(format!(
            "{} may not {} {}",
            actor.actor_type, requirement.action, requirement.resource
        )));
    }

    debug!(
        actor_id = actor.actor_id,
        action = requirement.action,
        resource = requirement.resource,
        "permission granted"
    );
    Ok(next.run(request).await)
}

pub trait AuthRouterExt {
    fn with_actor(self) -> Self;
    fn with_permission(
        self,
        gate: Arc<dyn PermissionGate>,
        action: &'static str,
        resource: &'static str,
    ) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_actor(self) -> Self {
        self.layer(axum::middleware::from_fn(actor_middleware))
    }

    fn with_permission(
        self,
        gate: Arc<dyn PermissionGate>,
        action: &'static str,
        resource: &'static str,
    ) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            PermissionRequirement {
                gate,
                action,
                resource,
            },
            permission_middleware,
        ))
        .with_actor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn actor_defaults_to_user() {
        let actor = ActorContext::from_headers(&headers(&[(ACTOR_ID_HEADER, "7")])).unwrap();
        assert_eq!(actor, ActorContext::user(7));

        let actor = ActorContext::from_headers(&headers(&[
            (ACTOR_ID_HEADER, "9"),
            (ACTOR_TYPE_HEADER, "Customer"),
        ]))
        .unwrap();
        assert_eq!(actor, ActorContext::customer(9));
    }

    #[test]
    fn missing_or_malformed_actor_is_unauthorized() {
        for map in [
            headers(&[]),
            headers(&[(ACTOR_ID_HEADER, "abc")]),
            headers(&[(ACTOR_ID_HEADER, "0")]),
            headers(&[(ACTOR_ID_HEADER, "3"), (ACTOR_TYPE_HEADER, "robot")]),
        ] {
            assert!(matches!(
                ActorContext::from_headers(&map),
                Err(ServiceError::Unauthorized(_))
            ));
        }
    }

    #[tokio::test]
    async fn static_grants_support_wildcards() {
        let gate = StaticPermissionGate::from_grants([
            "user:*:update:orders",
            "customer:42:*:invoices",
        ])
        .unwrap();

        assert!(
            gate.has_permission(&ActorContext::user(1), "update", "orders")
                .await
        );
        assert!(
            !gate
                .has_permission(&ActorContext::user(1), "delete", "orders")
                .await
        );
        assert!(
            gate.has_permission(&ActorContext::customer(42), "replace", "invoices")
                .await
        );
        assert!(
            !gate
                .has_permission(&ActorContext::customer(43), "replace", "invoices")
                .await
        );
    }

    #[test]
    fn malformed_grants_are_rejected() {
        assert!(StaticPermissionGate::from_grants(["user:orders"]).is_err());
        assert!(StaticPermissionGate::from_grants(["robot:*:*:*"]).is_err());
        assert!(StaticPermissionGate::from_grants(["user:x:*:*"]).is_err());
    }

    async fn ok() -> &'static str {
        "ok"
    }

    fn guarded(gate: Arc<dyn PermissionGate>) -> Router {
        Router::new()
            .route("/", post(ok))
            .with_permission(gate, "close", "carts")
    }

    #[tokio::test]
    async fn router_extension_enforces_gate() {
        let deny: Arc<dyn PermissionGate> =
            Arc::new(StaticPermissionGate::from_grants(["user:1:close:carts"]).unwrap());

        let allowed = guarded(deny.clone())
            .oneshot(
                HttpRequest::post("/")
                    .header(ACTOR_ID_HEADER, "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let forbidden = guarded(deny.clone())
            .oneshot(
                HttpRequest::post("/")
                    .header(ACTOR_ID_HEADER, "2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let anonymous = guarded(deny)
            .oneshot(HttpRequest::post("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    }
}
