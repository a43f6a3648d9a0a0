use crate::{
    meta,
    reconciler::{Context, Reconciler, Trigger},
};
use outpost_controller_core::{Component, OUTPOST_PATH_PREFIX};
use outpost_controller_k8s_api::traefik::{ForwardAuth, Middleware, MiddlewareSpec};

/// Lets Traefik delegate authentication to forward-auth proxy providers.
pub(crate) struct TraefikMiddlewareReconciler;

/// Headers the outpost sets on authenticated requests.
const AUTH_RESPONSE_HEADERS: [&str; 12] = [
    "X-authentik-username",
    "X-authentik-groups",
    "X-authentik-entitlements",
    "X-authentik-email",
    "X-authentik-name",
    "X-authentik-uid",
    "X-authentik-jwt",
    "X-authentik-meta-jwks",
    "X-authentik-meta-outpost",
    "X-authentik-meta-provider",
    "X-authentik-meta-app",
    "X-authentik-meta-version",
];

impl Reconciler for TraefikMiddlewareReconciler {
    type Object = Middleware;

    const COMPONENT: Component = Component::TraefikMiddleware;
    const EXTENSION: bool = true;

    fn skip(&self, ctx: &Context) -> bool {
        !ctx.outpost.uses_forward_auth()
    }

    fn reference(&self, ctx: &Context) -> Middleware {
        let address = format!(
            "http://{}.{}:9000{OUTPOST_PATH_PREFIX}/auth/traefik",
            ctx.name, ctx.namespace
        );
        Middleware {
            metadata: meta::object_meta(ctx, None),
            spec: MiddlewareSpec {
                forward_auth: Some(ForwardAuth {
                    address,
                    auth_response_headers: AUTH_RESPONSE_HEADERS
                        .iter()
                        .map(|h| h.to_string())
                        .collect(),
                    auth_response_headers_regex: String::new(),
                    trust_forward_header: true,
                }),
            },
        }
    }

    fn compare(&self, current: &Middleware, reference: &Middleware, _: &Context) -> Trigger {
        let (Some(current), Some(reference)) = (
            current.spec.forward_auth.as_ref(),
            reference.spec.forward_auth.as_ref(),
        ) else {
            return Trigger::Update;
        };

        if current.address != reference.address {
            tracing::debug!("Forward-auth address differs");
            return Trigger::Update;
        }
        if current.auth_response_headers_regex != reference.auth_response_headers_regex
            || current.trust_forward_header != reference.trust_forward_header
        {
            return Trigger::Update;
        }

        // Operators may forward additional headers.
        Trigger::update_if(
            !reference
                .auth_response_headers
                .iter()
                .all(|h| current.auth_response_headers.contains(h)),
        )
    }
}
