use crate::{
    meta,
    reconciler::{Context, Reconciler, Trigger},
};
use outpost_controller_core::Component;
use outpost_controller_k8s_api::{ByteString, Secret};

/// Holds the settings the outpost process reads from its environment.
pub(crate) struct SecretReconciler;

impl Reconciler for SecretReconciler {
    type Object = Secret;

    const COMPONENT: Component = Component::Secret;

    fn skip(&self, ctx: &Context) -> bool {
        ctx.outpost.embedded
    }

    fn reference(&self, ctx: &Context) -> Secret {
        let config = ctx.config();
        let data = [
            ("authentik_host", config.authentik_host.clone()),
            (
                "authentik_host_insecure",
                config.authentik_host_insecure.to_string(),
            ),
            ("token", ctx.outpost.token.clone()),
            ("authentik_host_browser", config.authentik_host_browser.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.into_bytes())))
        .collect();

        Secret {
            metadata: meta::object_meta(ctx, None),
            data: Some(data),
            ..Default::default()
        }
    }

    fn compare(&self, current: &Secret, reference: &Secret, _: &Context) -> Trigger {
        let current = current.data.as_ref();
        let drifted = reference
            .data
            .iter()
            .flatten()
            .any(|(k, v)| current.and_then(|data| data.get(k)) != Some(v));
        Trigger::update_if(drifted)
    }
}
