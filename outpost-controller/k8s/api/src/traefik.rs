use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Traefik's Middleware, as far as its `forwardAuth` form is concerned.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "traefik.io",
    version = "v1alpha1",
    kind = "Middleware",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_auth: Option<ForwardAuth>,
}

/// Delegates authentication of each request to an external service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForwardAuth {
    pub address: String,

    #[serde(default)]
    pub auth_response_headers: Vec<String>,

    #[serde(default)]
    pub auth_response_headers_regex: String,

    #[serde(default)]
    pub trust_forward_header: bool,
}
