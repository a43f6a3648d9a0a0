use crate::reconciler::Context;
use outpost_controller_core::{naming, MANAGED_BY};
use outpost_controller_k8s_api::ObjectMeta;
use std::collections::BTreeMap;

pub(crate) type Labels = BTreeMap<String, String>;

/// Labels carried by every object managed for an outpost.
pub(crate) fn labels(ctx: &Context) -> Labels {
    let outpost = &ctx.outpost;
    let slug = naming::label_value(&outpost.name);
    [
        ("app.kubernetes.io/instance", slug.clone()),
        ("app.kubernetes.io/managed-by", MANAGED_BY.to_string()),
        ("app.kubernetes.io/name", format!("authentik-{}", outpost.kind)),
        ("app.kubernetes.io/version", ctx.platform.label_version()),
        ("goauthentik.io/outpost-name", slug),
        ("goauthentik.io/outpost-type", outpost.kind.to_string()),
        ("goauthentik.io/outpost-uuid", outpost.uuid_hex()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Labels selecting the outpost's pods.
///
/// They do not depend on the outpost's name, so a renamed outpost keeps
/// selecting the same pods.
pub(crate) fn selector_labels(ctx: &Context) -> Labels {
    let outpost = &ctx.outpost;
    [
        ("app.kubernetes.io/managed-by", MANAGED_BY.to_string()),
        ("app.kubernetes.io/name", format!("authentik-outpost-{}", outpost.kind)),
        ("goauthentik.io/outpost-uuid", outpost.uuid_hex()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub(crate) fn object_meta(ctx: &Context, annotations: Option<Labels>) -> ObjectMeta {
    ObjectMeta {
        name: Some(ctx.name.clone()),
        namespace: Some(ctx.namespace.clone()),
        labels: Some(labels(ctx)),
        annotations: annotations.filter(|a| !a.is_empty()),
        ..Default::default()
    }
}

/// Whether `current` carries every label and annotation of `reference`.
///
/// Entries added by other controllers are tolerated.
pub(crate) fn contains(current: &ObjectMeta, reference: &ObjectMeta) -> bool {
    subset(reference.labels.as_ref(), current.labels.as_ref())
        && subset(reference.annotations.as_ref(), current.annotations.as_ref())
}

fn subset(wanted: Option<&Labels>, actual: Option<&Labels>) -> bool {
    wanted
        .into_iter()
        .flatten()
        .all(|(k, v)| actual.and_then(|a| a.get(k)) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn meta(labels: Labels, annotations: Option<Labels>) -> ObjectMeta {
        ObjectMeta {
            labels: Some(labels),
            annotations,
            ..Default::default()
        }
    }

    #[test]
    fn extra_entries_are_tolerated() {
        let reference = meta(btreemap! {"a".into() => "1".into()}, None);
        let current = meta(
            btreemap! {"a".into() => "1".into(), "b".into() => "2".into()},
            Some(btreemap! {"deployment.kubernetes.io/revision".into() => "3".into()}),
        );
        assert!(contains(&current, &reference));
    }

    #[test]
    fn missing_or_changed_entries_are_detected() {
        let reference = meta(
            btreemap! {"a".into() => "1".into()},
            Some(btreemap! {"x".into() => "y".into()}),
        );
        assert!(!contains(&meta(btreemap! {}, Some(btreemap! {"x".into() => "y".into()})), &reference));
        assert!(!contains(
            &meta(btreemap! {"a".into() => "2".into()}, Some(btreemap! {"x".into() => "y".into()})),
            &reference
        ));
        assert!(!contains(&meta(btreemap! {"a".into() => "1".into()}, None), &reference));
    }
}
