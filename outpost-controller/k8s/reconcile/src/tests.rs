use crate::KubernetesController;
use async_trait::async_trait;
use outpost_controller_core::{
    NoopObserver, Observe, Outpost, OutpostConfig, OutpostType, Platform, Profile, Provider,
    ProviderProtocol, ProxyMode, ProxyProvider,
};
use outpost_controller_k8s_api::{Cluster, Error, ErrorResponse, Object};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

mod reconcilers;

pub(crate) const UUID: &str = "0b7c7f2c-5a57-4e43-9d8a-6b4ad4fc0e1b";
pub(crate) const NAMESPACE: &str = "authentik";

/// An API call made against a `FakeCluster`, by object kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Discover(String),
    Get(String),
    List(String),
    Create(String),
    Apply(String),
    Delete(String),
}

/// An in-memory cluster that records every call made against it.
#[derive(Clone, Default)]
pub(crate) struct FakeCluster(Arc<Mutex<State>>);

#[derive(Default)]
struct State {
    objects: BTreeMap<(String, String, String), serde_json::Value>,
    extensions: BTreeSet<String>,
    calls: Vec<Call>,
    failures: BTreeMap<(String, &'static str), u16>,
}

pub(crate) fn platform() -> Platform {
    Platform {
        version: "2025.2.1".to_string(),
        build_hash: String::new(),
        image_base: outpost_controller_core::DEFAULT_IMAGE_BASE.to_string(),
    }
}

pub(crate) fn outpost(kind: OutpostType) -> Outpost {
    Outpost {
        uuid: UUID.parse().expect("uuid must parse"),
        name: format!("Test {kind}"),
        kind,
        token: "outpost-token".to_string(),
        providers: vec![],
        embedded: false,
        config: OutpostConfig {
            authentik_host: "https://auth.example.com".to_string(),
            kubernetes_namespace: NAMESPACE.to_string(),
            ..Default::default()
        },
    }
}

pub(crate) fn proxy_outpost() -> Outpost {
    let proxy = |name: &str, external_host: &str, mode| Provider {
        name: name.to_string(),
        protocol: ProviderProtocol::Proxy(ProxyProvider {
            external_host: external_host.to_string(),
            mode,
        }),
    };
    Outpost {
        providers: vec![
            proxy("grafana", "https://grafana.example.com", ProxyMode::Proxy),
            proxy("apps", "http://apps.example.com", ProxyMode::ForwardSingle),
        ],
        ..outpost(OutpostType::Proxy)
    }
}

pub(crate) fn controller(cluster: &FakeCluster, outpost: Outpost) -> KubernetesController<FakeCluster> {
    controller_with_observer(cluster, outpost, Arc::new(NoopObserver))
}

pub(crate) fn controller_with_observer(
    cluster: &FakeCluster,
    outpost: Outpost,
    observer: Arc<dyn Observe>,
) -> KubernetesController<FakeCluster> {
    let profile = Profile::for_type(outpost.kind);
    KubernetesController::new(
        cluster.clone(),
        Arc::new(outpost),
        &platform(),
        &profile,
        observer,
    )
}

fn kind<K: Object>() -> String {
    K::kind(&()).to_string()
}

fn api_error(code: u16) -> Error {
    Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {code}"),
        reason: "Injected".to_string(),
        code,
    })
}

// === impl Call ===

impl Call {
    pub(crate) fn kind(&self) -> &str {
        match self {
            Self::Discover(k)
            | Self::Get(k)
            | Self::List(k)
            | Self::Create(k)
            | Self::Apply(k)
            | Self::Delete(k) => k,
        }
    }

    pub(crate) fn is_mutation(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Apply(_) | Self::Delete(_))
    }
}

// === impl FakeCluster ===

impl FakeCluster {
    /// A cluster serving the given extension kinds.
    pub(crate) fn with_extensions(kinds: &[&str]) -> Self {
        let cluster = Self::default();
        cluster.0.lock().extensions = kinds.iter().map(|k| k.to_string()).collect();
        cluster
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.lock().calls.clone()
    }

    pub(crate) fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.0.lock().calls.clear();
    }

    /// Makes every `op` call for `K` fail with `code`.
    pub(crate) fn fail<K: Object>(&self, op: &'static str, code: u16) {
        self.0.lock().failures.insert((kind::<K>(), op), code);
    }

    pub(crate) fn heal(&self) {
        self.0.lock().failures.clear();
    }

    pub(crate) fn object<K: Object>(&self, name: &str) -> Option<K> {
        let state = self.0.lock();
        state
            .objects
            .get(&(kind::<K>(), NAMESPACE.to_string(), name.to_string()))
            .map(|v| serde_json::from_value(v.clone()).expect("stored object must decode"))
    }

    /// Replaces an object as if another client had written it.
    pub(crate) fn put<K: Object>(&self, name: &str, object: &K) {
        let value = serde_json::to_value(object).expect("object must encode");
        self.0
            .lock()
            .objects
            .insert((kind::<K>(), NAMESPACE.to_string(), name.to_string()), value);
    }
}

impl State {
    fn call(&mut self, call: Call, op: &'static str) -> Result<(), Error> {
        let key = (call.kind().to_string(), op);
        self.calls.push(call);
        match self.failures.get(&key) {
            Some(code) => Err(api_error(*code)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        let mut state = self.0.lock();
        state.call(Call::Get(kind::<K>()), "get")?;
        let value = state
            .objects
            .get(&(kind::<K>(), namespace.to_string(), name.to_string()))
            .cloned();
        Ok(value.map(|v| serde_json::from_value(v).expect("stored object must decode")))
    }

    async fn list<K: Object>(&self, namespace: &str) -> Result<Vec<K>, Error> {
        let mut state = self.0.lock();
        state.call(Call::List(kind::<K>()), "list")?;
        let kind = kind::<K>();
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .map(|(_, v)| serde_json::from_value(v.clone()).expect("stored object must decode"))
            .collect())
    }

    async fn create<K: Object>(&self, namespace: &str, object: &K) -> Result<(), Error> {
        let mut state = self.0.lock();
        state.call(Call::Create(kind::<K>()), "create")?;
        let name = object.meta().name.clone().expect("object must be named");
        let key = (kind::<K>(), namespace.to_string(), name);
        if state.objects.contains_key(&key) {
            return Err(api_error(409));
        }
        let value = serde_json::to_value(object).expect("object must encode");
        state.objects.insert(key, value);
        Ok(())
    }

    async fn apply<K: Object>(&self, namespace: &str, name: &str, object: &K) -> Result<(), Error> {
        let mut state = self.0.lock();
        state.call(Call::Apply(kind::<K>()), "apply")?;
        let value = serde_json::to_value(object).expect("object must encode");
        state
            .objects
            .insert((kind::<K>(), namespace.to_string(), name.to_string()), value);
        Ok(())
    }

    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let mut state = self.0.lock();
        state.call(Call::Delete(kind::<K>()), "delete")?;
        match state
            .objects
            .remove(&(kind::<K>(), namespace.to_string(), name.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(api_error(404)),
        }
    }

    async fn serves<K: Object>(&self) -> bool {
        let mut state = self.0.lock();
        state.calls.push(Call::Discover(kind::<K>()));
        state.extensions.contains(&kind::<K>())
    }

    async fn version(&self) -> Result<String, Error> {
        Ok("v1.33.1".to_string())
    }
}
