use crate::reconciler::Context;
use outpost_controller_k8s_api::{Cluster, Error, ResourceExt, Secret};
use tracing::{debug, warn};

/// Database settings that may name a file rather than carry a value.
const FILE_SETTINGS: [&str; 4] = [
    "AUTHENTIK_POSTGRESQL__USER",
    "AUTHENTIK_POSTGRESQL__PASSWORD",
    "AUTHENTIK_POSTGRESQL__NAME",
    "AUTHENTIK_POSTGRESQL__HOST",
];

/// Keys that identify a Secret holding database credentials.
const CREDENTIAL_KEYS: [&str; 3] = ["username", "password", "database"];

/// A Secret mounted into the outpost so that `file://` database settings
/// resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialFiles {
    pub secret: String,
    pub mount_path: String,
    pub volume: String,
}

/// Finds the credentials Secret to mount, if the outpost's database
/// settings refer to files.
///
/// Failures are logged rather than returned: the outpost is still deployed,
/// just without the mount.
pub(crate) async fn credential_files<C: Cluster>(
    cluster: &C,
    ctx: &Context,
) -> Option<CredentialFiles> {
    let secret = ctx.config().postgresql_secret()?;
    match resolve(cluster, ctx, secret).await {
        Ok(files) => files,
        Err(error) => {
            warn!(%error, %secret, "Failed to read database settings");
            None
        }
    }
}

async fn resolve<C: Cluster>(
    cluster: &C,
    ctx: &Context,
    secret: &str,
) -> Result<Option<CredentialFiles>, Error> {
    let Some(settings) = cluster.get::<Secret>(&ctx.namespace, secret).await? else {
        warn!(%secret, "Database settings Secret does not exist");
        return Ok(None);
    };
    let Some(mount_path) = settings_mount_path(&settings) else {
        return Ok(None);
    };
    debug!(%mount_path, "Database settings refer to files");

    let configured = &ctx.config().kubernetes_postgresql_credentials_secret_name;
    let credentials = if configured.is_empty() {
        let detected = cluster
            .list::<Secret>(&ctx.namespace)
            .await?
            .into_iter()
            .find(has_credential_keys)
            .map(|s| s.name_any());
        if let Some(name) = &detected {
            debug!(secret = %name, "Detected database credentials Secret");
        }
        detected
    } else {
        Some(configured.clone())
    };

    let Some(credentials) = credentials else {
        warn!(
            %secret,
            "Database settings refer to files but no credentials Secret was found; \
             set kubernetes_postgresql_credentials_secret_name"
        );
        return Ok(None);
    };

    Ok(Some(CredentialFiles {
        secret: credentials,
        volume: mount_path.trim_start_matches('/').to_string(),
        mount_path,
    }))
}

/// The directory the first `file://` setting lives in.
fn settings_mount_path(settings: &Secret) -> Option<String> {
    let data = settings.data.as_ref()?;
    FILE_SETTINGS
        .iter()
        .filter_map(|key| data.get(*key))
        .filter_map(|value| std::str::from_utf8(&value.0).ok())
        .find_map(mount_path)
}

/// `file:///postgres-creds/username` is mounted at `/postgres-creds`.
fn mount_path(value: &str) -> Option<String> {
    let path = value.strip_prefix("file://")?;
    let dir = path.trim_start_matches('/').split('/').next()?;
    (!dir.is_empty()).then(|| format!("/{dir}"))
}

fn has_credential_keys(secret: &Secret) -> bool {
    secret
        .data
        .as_ref()
        .is_some_and(|data| CREDENTIAL_KEYS.iter().all(|key| data.contains_key(*key)))
}
