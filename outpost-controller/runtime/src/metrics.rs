use crate::core::{ConnectionState, Observe, Outcome, Outpost};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Exports reconciliation events as Prometheus metrics.
#[derive(Clone, Debug)]
pub struct Metrics {
    reconciled: Family<ReconcileLabels, Counter>,
    changed: Family<ComponentLabels, Counter>,
    failed: Family<ComponentLabels, Counter>,
    connection_healthy: Family<ConnectionLabels, Gauge>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReconcileLabels {
    outpost: String,
    outpost_type: &'static str,
    component: String,
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ComponentLabels {
    outpost: String,
    outpost_type: &'static str,
    component: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ConnectionLabels {
    connection: String,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reconciled = Family::<ReconcileLabels, Counter>::default();
        reg.register(
            "reconciled",
            "Total number of reconciliation steps completed, by outcome",
            reconciled.clone(),
        );

        let changed = Family::<ComponentLabels, Counter>::default();
        reg.register(
            "changed",
            "Total number of reconciliation steps that changed the backend",
            changed.clone(),
        );

        let failed = Family::<ComponentLabels, Counter>::default();
        reg.register(
            "failed",
            "Total number of reconciliation steps that failed",
            failed.clone(),
        );

        let connection_healthy = Family::<ConnectionLabels, Gauge>::default();
        reg.register(
            "connection_healthy",
            "Whether a service connection was reachable when last checked",
            connection_healthy.clone(),
        );

        Self {
            reconciled,
            changed,
            failed,
            connection_healthy,
        }
    }
}

impl Observe for Metrics {
    fn reconciled(&self, outpost: &Outpost, component: &str, outcome: Outcome) {
        self.reconciled
            .get_or_create(&ReconcileLabels {
                outpost: outpost.slug(),
                outpost_type: outpost.kind.as_str(),
                component: component.to_string(),
                outcome: outcome.as_str(),
            })
            .inc();
        if outcome.is_mutation() {
            self.changed
                .get_or_create(&component_labels(outpost, component))
                .inc();
        }
    }

    fn failed(&self, outpost: &Outpost, component: &str) {
        self.failed
            .get_or_create(&component_labels(outpost, component))
            .inc();
    }

    fn connection_state(&self, connection: &str, state: &ConnectionState) {
        self.connection_healthy
            .get_or_create(&ConnectionLabels {
                connection: connection.to_string(),
            })
            .set(i64::from(state.healthy));
    }
}

fn component_labels(outpost: &Outpost, component: &str) -> ComponentLabels {
    ComponentLabels {
        outpost: outpost.slug(),
        outpost_type: outpost.kind.as_str(),
        component: component.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OutpostConfig, OutpostType};
    use prometheus_client::encoding::text::encode;

    #[test]
    fn encodes_outcomes() {
        let mut registry = Registry::with_prefix("outpost_controller");
        let metrics = Metrics::register(&mut registry);
        let outpost = Outpost {
            uuid: Default::default(),
            name: "Campus RADIUS".to_string(),
            kind: OutpostType::Radius,
            token: String::new(),
            providers: vec![],
            embedded: false,
            config: OutpostConfig::default(),
        };

        metrics.reconciled(&outpost, "secret", Outcome::Created);
        metrics.reconciled(&outpost, "secret", Outcome::Created);
        metrics.reconciled(&outpost, "service", Outcome::Unchanged);
        metrics.failed(&outpost, "deployment");
        metrics.connection_state("local", &ConnectionState::healthy("1.33.1"));

        let mut text = String::new();
        encode(&mut text, &registry).expect("metrics must encode");
        assert!(text.contains(
            r#"outpost_controller_reconciled_total{outpost="campus-radius",outpost_type="radius",component="secret",outcome="created"} 2"#
        ), "{text}");
        assert!(text.contains(
            r#"outpost_controller_changed_total{outpost="campus-radius",outpost_type="radius",component="secret"} 2"#
        ), "{text}");
        assert!(
            !text.contains(r#"outpost_controller_changed_total{outpost="campus-radius",outpost_type="radius",component="service"}"#),
            "{text}"
        );
        assert!(text.contains(
            r#"outpost_controller_failed_total{outpost="campus-radius",outpost_type="radius",component="deployment"} 1"#
        ), "{text}");
        assert!(
            text.contains(r#"outpost_controller_connection_healthy{connection="local"} 1"#),
            "{text}"
        );
    }
}
