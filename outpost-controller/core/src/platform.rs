use crate::{naming, Outpost, OutpostType};

/// Image template used when an outpost does not name its own image.
pub const DEFAULT_IMAGE_BASE: &str = "ghcr.io/goauthentik/%(type)s:%(version)s";

/// Facts about the platform release deploying outposts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Platform {
    pub version: String,
    pub build_hash: String,

    /// Image template with `%(type)s`, `%(version)s` and `%(build_hash)s`
    /// keys.
    pub image_base: String,
}

// === impl Platform ===

impl Default for Platform {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_hash: String::new(),
            image_base: DEFAULT_IMAGE_BASE.to_string(),
        }
    }
}

impl Platform {
    pub fn full_version(&self) -> String {
        if self.build_hash.is_empty() {
            return self.version.clone();
        }
        format!("{}+{}", self.version, self.build_hash)
    }

    /// The version as a label value; `+` is not allowed there.
    pub fn label_version(&self) -> String {
        self.full_version().replace('+', "-")
    }

    /// The image an outpost's workload should run.
    pub fn container_image(&self, outpost: &Outpost) -> String {
        if let Some(image) = outpost.config.container_image.as_deref() {
            if !image.trim().is_empty() {
                return image.to_string();
            }
        }

        let values = [
            ("type", outpost.kind.as_str()),
            ("version", self.version.as_str()),
            ("build_hash", self.build_hash.as_str()),
        ];
        naming::format_template(&self.image_base, &values).unwrap_or_else(|| {
            tracing::warn!(template = %self.image_base, "Invalid image template");
            naming::format_template(DEFAULT_IMAGE_BASE, &values).unwrap_or_default()
        })
    }

    /// A published image tag used when the desired image cannot be pulled.
    pub fn fallback_image(kind: OutpostType) -> String {
        format!("ghcr.io/goauthentik/{kind}:latest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OutpostConfig;

    fn outpost(container_image: Option<&str>) -> Outpost {
        Outpost {
            uuid: uuid::Uuid::nil(),
            name: "ldap".to_string(),
            kind: OutpostType::Ldap,
            token: String::new(),
            providers: vec![],
            embedded: false,
            config: OutpostConfig {
                container_image: container_image.map(Into::into),
                ..Default::default()
            },
        }
    }

    #[test]
    fn image_from_template() {
        let platform = Platform {
            version: "2025.2.1".to_string(),
            build_hash: "abc123".to_string(),
            image_base: "registry.local/%(type)s:%(version)s-%(build_hash)s".to_string(),
        };
        assert_eq!(
            platform.container_image(&outpost(None)),
            "registry.local/ldap:2025.2.1-abc123"
        );
        assert_eq!(
            platform.container_image(&outpost(Some("mirror/ldap:pinned"))),
            "mirror/ldap:pinned"
        );
        assert_eq!(platform.label_version(), "2025.2.1-abc123");
    }

    #[test]
    fn unknown_template_key_uses_default_base() {
        let platform = Platform {
            version: "2025.2.1".to_string(),
            build_hash: String::new(),
            image_base: "registry.local/%(flavor)s".to_string(),
        };
        assert_eq!(
            platform.container_image(&outpost(None)),
            "ghcr.io/goauthentik/ldap:2025.2.1"
        );
        assert_eq!(platform.full_version(), "2025.2.1");
        assert_eq!(
            Platform::fallback_image(OutpostType::Ldap),
            "ghcr.io/goauthentik/ldap:latest"
        );
    }
}
