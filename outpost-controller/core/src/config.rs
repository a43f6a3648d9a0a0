use crate::Component;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-outpost deployment settings.
///
/// Every field has a default so that partial documents decode.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutpostConfig {
    /// URL the outpost uses to reach the platform.
    pub authentik_host: String,
    pub authentik_host_insecure: bool,
    /// URL end users' browsers are redirected to, when it differs from
    /// `authentik_host`.
    pub authentik_host_browser: String,

    /// Template for object and container names, with `%(name)s` and
    /// `%(uuid)s` keys.
    pub object_naming_template: String,
    /// Overrides the platform's image template when set.
    pub container_image: Option<String>,

    pub docker_network: Option<String>,
    pub docker_map_ports: bool,
    pub docker_labels: BTreeMap<String, String>,

    pub kubernetes_replicas: i32,
    pub kubernetes_namespace: String,
    pub kubernetes_service_type: String,
    pub kubernetes_disabled_components: BTreeSet<String>,
    pub kubernetes_image_pull_secrets: Vec<String>,
    pub kubernetes_ingress_annotations: BTreeMap<String, String>,
    pub kubernetes_ingress_secret_name: String,
    pub kubernetes_ingress_class_name: Option<String>,
    pub kubernetes_httproute_annotations: BTreeMap<String, String>,
    pub kubernetes_httproute_parent_refs: Vec<ParentRef>,
    pub kubernetes_tcproute_parent_refs: Vec<ParentRef>,
    pub kubernetes_udproute_parent_refs: Vec<ParentRef>,

    /// JSON patches applied to reference objects, keyed by component name.
    pub kubernetes_json_patches: BTreeMap<String, json_patch::Patch>,

    /// Where the outpost stores sessions; `postgres` makes the Deployment
    /// load database settings from `kubernetes_postgresql_secret_name`.
    pub session_backend: String,
    pub kubernetes_postgresql_secret_name: String,
    /// Holds the files that `file://` database settings point at. Detected
    /// from the namespace's Secrets when unset.
    pub kubernetes_postgresql_credentials_secret_name: String,
}

/// A gateway a route attaches to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

// === impl OutpostConfig ===

impl Default for OutpostConfig {
    fn default() -> Self {
        Self {
            authentik_host: String::new(),
            authentik_host_insecure: false,
            authentik_host_browser: String::new(),
            object_naming_template: "ak-outpost-%(name)s".to_string(),
            container_image: None,
            docker_network: None,
            docker_map_ports: true,
            docker_labels: BTreeMap::new(),
            kubernetes_replicas: 1,
            kubernetes_namespace: "default".to_string(),
            kubernetes_service_type: "ClusterIP".to_string(),
            kubernetes_disabled_components: BTreeSet::new(),
            kubernetes_image_pull_secrets: Vec::new(),
            kubernetes_ingress_annotations: BTreeMap::new(),
            kubernetes_ingress_secret_name: "authentik-outpost-tls".to_string(),
            kubernetes_ingress_class_name: None,
            kubernetes_httproute_annotations: BTreeMap::new(),
            kubernetes_httproute_parent_refs: Vec::new(),
            kubernetes_tcproute_parent_refs: Vec::new(),
            kubernetes_udproute_parent_refs: Vec::new(),
            kubernetes_json_patches: BTreeMap::new(),
            session_backend: String::new(),
            kubernetes_postgresql_secret_name: String::new(),
            kubernetes_postgresql_credentials_secret_name: String::new(),
        }
    }
}

impl OutpostConfig {
    /// Names that match no component are ignored.
    pub fn is_disabled(&self, component: Component) -> bool {
        self.kubernetes_disabled_components
            .contains(component.as_str())
    }

    pub fn postgres_sessions(&self) -> bool {
        self.session_backend.eq_ignore_ascii_case("postgres")
            || self.session_backend.eq_ignore_ascii_case("postgresql")
    }

    /// The Secret the outpost's database settings are loaded from, when
    /// sessions are stored in Postgres.
    pub fn postgresql_secret(&self) -> Option<&str> {
        if !self.postgres_sessions() {
            return None;
        }
        Some(self.kubernetes_postgresql_secret_name.as_str()).filter(|name| !name.is_empty())
    }

    pub fn json_patch(&self, component: Component) -> Option<&json_patch::Patch> {
        self.kubernetes_json_patches
            .get(component.as_str())
            .filter(|p| !p.0.is_empty())
    }
}
