use crate::{naming, OutpostConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An outpost as assigned to this controller.
///
/// The record is owned elsewhere; controllers only read it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Outpost {
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OutpostType,

    /// Token the deployed outpost authenticates to the platform with.
    pub token: String,

    #[serde(default)]
    pub providers: Vec<Provider>,

    /// Set on the platform's own embedded outpost, whose workload is managed
    /// alongside the platform rather than by this controller.
    #[serde(default)]
    pub embedded: bool,

    #[serde(default)]
    pub config: OutpostConfig,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutpostType {
    Proxy,
    Ldap,
    Radius,
    Rac,
    Scim,
    Kerberos,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Provider {
    pub name: String,
    #[serde(flatten)]
    pub protocol: ProviderProtocol,
}

/// The protocol-specific part of a provider.
///
/// Only the proxy protocol carries fields that influence deployment.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ProviderProtocol {
    Proxy(ProxyProvider),
    Ldap,
    Radius,
    Rac,
    Scim,
    Kerberos,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProxyProvider {
    pub external_host: String,
    #[serde(default)]
    pub mode: ProxyMode,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    #[default]
    Proxy,
    ForwardSingle,
    ForwardDomain,
}

// === impl Outpost ===

impl Outpost {
    pub fn uuid_hex(&self) -> String {
        self.uuid.simple().to_string()
    }

    pub fn slug(&self) -> String {
        naming::slugify(&self.name)
    }

    pub fn proxy_providers(&self) -> impl Iterator<Item = &ProxyProvider> + '_ {
        self.providers.iter().filter_map(|p| match &p.protocol {
            ProviderProtocol::Proxy(proxy) => Some(proxy),
            _ => None,
        })
    }

    /// Whether any assigned proxy provider authenticates requests on behalf
    /// of another reverse proxy.
    pub fn uses_forward_auth(&self) -> bool {
        self.proxy_providers().any(|p| p.mode.is_forward_auth())
    }
}

// === impl OutpostType ===

impl OutpostType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Ldap => "ldap",
            Self::Radius => "radius",
            Self::Rac => "rac",
            Self::Scim => "scim",
            Self::Kerberos => "kerberos",
        }
    }
}

impl fmt::Display for OutpostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ProxyProvider ===

impl ProxyProvider {
    /// The host part of the provider's external URL.
    pub fn host(&self) -> Option<String> {
        let uri = self.external_host.parse::<http::Uri>().ok()?;
        uri.host().filter(|h| !h.is_empty()).map(str::to_lowercase)
    }

    pub fn is_tls(&self) -> bool {
        self.external_host
            .parse::<http::Uri>()
            .ok()
            .and_then(|uri| uri.scheme_str().map(|s| s.eq_ignore_ascii_case("https")))
            .unwrap_or(false)
    }
}

// === impl ProxyMode ===

impl ProxyMode {
    pub fn is_forward_auth(&self) -> bool {
        matches!(self, Self::ForwardSingle | Self::ForwardDomain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_outpost_document() {
        let outpost = serde_yaml::from_str::<Outpost>(
            r#"
uuid: 0b7c7f2c-5a57-4e43-9d8a-6b4ad4fc0e1b
name: Default Proxy
type: proxy
token: s3cret
providers:
  - name: grafana
    protocol: proxy
    external_host: https://Grafana.example.com/
  - name: traefik
    protocol: proxy
    external_host: http://apps.example.com
    mode: forward_domain
  - name: directory
    protocol: ldap
"#,
        )
        .expect("outpost must decode");

        assert_eq!(outpost.kind, OutpostType::Proxy);
        assert_eq!(outpost.uuid_hex(), "0b7c7f2c5a574e439d8a6b4ad4fc0e1b");
        assert_eq!(outpost.slug(), "default-proxy");
        assert!(outpost.uses_forward_auth());

        let proxies = outpost.proxy_providers().collect::<Vec<_>>();
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].host().as_deref(), Some("grafana.example.com"));
        assert!(proxies[0].is_tls());
        assert!(!proxies[1].is_tls());
        assert_eq!(outpost.config, OutpostConfig::default());
    }

    #[test]
    fn provider_without_external_host_has_no_host() {
        let provider = ProxyProvider {
            external_host: String::new(),
            mode: ProxyMode::Proxy,
        };
        assert_eq!(provider.host(), None);
        assert!(!provider.is_tls());
    }
}
