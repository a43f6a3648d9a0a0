use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    core::NamespaceResourceScope,
    Client, Error, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use tracing::warn;

/// Identifies this controller as the owner of the fields it writes.
pub const FIELD_MANAGER: &str = "goauthentik.io";

/// A namespaced object kind with a static type.
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

/// The API operations reconcilers need from a cluster.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Fetches an object, returning `None` if it does not exist.
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>;

    async fn list<K: Object>(&self, namespace: &str) -> Result<Vec<K>, Error>;

    async fn create<K: Object>(&self, namespace: &str, object: &K) -> Result<(), Error>;

    /// Applies `object` server-side, taking ownership of its fields.
    async fn apply<K: Object>(&self, namespace: &str, name: &str, object: &K)
        -> Result<(), Error>;

    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Whether the API server serves `K`, i.e. whether its extension is
    /// installed.
    async fn serves<K: Object>(&self) -> bool;

    async fn version(&self) -> Result<String, Error>;
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

// === impl Client ===

#[async_trait]
impl Cluster for Client {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        Api::<K>::namespaced(self.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn list<K: Object>(&self, namespace: &str) -> Result<Vec<K>, Error> {
        let list = Api::<K>::namespaced(self.clone(), namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn create<K: Object>(&self, namespace: &str, object: &K) -> Result<(), Error> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Api::<K>::namespaced(self.clone(), namespace)
            .create(&params, object)
            .await?;
        Ok(())
    }

    async fn apply<K: Object>(
        &self,
        namespace: &str,
        name: &str,
        object: &K,
    ) -> Result<(), Error> {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Api::<K>::namespaced(self.clone(), namespace)
            .patch(name, &params, &Patch::Apply(object))
            .await?;
        Ok(())
    }

    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<(), Error> {
        Api::<K>::namespaced(self.clone(), namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn serves<K: Object>(&self) -> bool {
        let group_version = K::api_version(&());
        match self.list_api_group_resources(&group_version).await {
            Ok(list) => list.resources.iter().any(|r| r.kind == K::kind(&())),
            Err(Error::Api(error)) if error.code == 404 => false,
            Err(error) => {
                warn!(%error, %group_version, "Failed to discover API resources");
                false
            }
        }
    }

    async fn version(&self) -> Result<String, Error> {
        let info = self.apiserver_version().await?;
        Ok(info.git_version)
    }
}
