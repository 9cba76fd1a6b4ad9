//! Read-write splitting: resolve a logical group to its write node or one
//! enabled read replica.
//!
//! Replica availability lives in a [`DataSourceStateRegistry`] shared by
//! whoever detects failures (health checks, operators). Routing never reads
//! the registry directly: callers take a [`DisabledDataSources`] snapshot once
//! per statement and pass it in, so one statement sees one consistent view.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kestrel_algorithm::{AlgorithmRegistry, LoadBalanceAlgorithm, RoundRobinLoadBalancer};
use kestrel_common::config::KestrelConfig;
use kestrel_common::error::ConfigError;
use kestrel_common::statement::BoundStatement;
use parking_lot::RwLock;

use crate::context::RouteContext;
use crate::hint::HintValues;

/// Shared set of disabled data sources.
#[derive(Debug, Default)]
pub struct DataSourceStateRegistry {
    disabled: RwLock<Arc<BTreeSet<String>>>,
}

impl DataSourceStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the state changed.
    pub fn disable(&self, data_source: &str) -> bool {
        let mut guard = self.disabled.write();
        if guard.contains(data_source) {
            return false;
        }
        let mut next = (**guard).clone();
        next.insert(data_source.to_string());
        kestrel_observability::record_disabled_data_sources(next.len());
        *guard = Arc::new(next);
        tracing::warn!(data_source = %data_source, "data source disabled");
        true
    }

    /// Returns true if the state changed.
    pub fn enable(&self, data_source: &str) -> bool {
        let mut guard = self.disabled.write();
        if !guard.contains(data_source) {
            return false;
        }
        let mut next = (**guard).clone();
        next.remove(data_source);
        kestrel_observability::record_disabled_data_sources(next.len());
        *guard = Arc::new(next);
        tracing::info!(data_source = %data_source, "data source enabled");
        true
    }

    pub fn is_disabled(&self, data_source: &str) -> bool {
        self.disabled.read().contains(data_source)
    }

    /// Immutable view for one statement; later changes do not affect it.
    pub fn snapshot(&self) -> DisabledDataSources {
        DisabledDataSources(Arc::clone(&self.disabled.read()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DisabledDataSources(Arc<BTreeSet<String>>);

impl DisabledDataSources {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Arc::new(names.into_iter().map(Into::into).collect()))
    }

    pub fn contains(&self, data_source: &str) -> bool {
        self.0.contains(data_source)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-session facts routing needs. Owned by the session, updated by the
/// caller as statements complete.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionState {
    pub in_transaction: bool,
    pub wrote_in_transaction: bool,
}

impl SessionState {
    pub fn begin(&mut self) {
        self.in_transaction = true;
        self.wrote_in_transaction = false;
    }

    pub fn end(&mut self) {
        self.in_transaction = false;
        self.wrote_in_transaction = false;
    }

    /// Record a statement that was not read-only. Outside a transaction this
    /// is a no-op.
    pub fn note_write(&mut self) {
        if self.in_transaction {
            self.wrote_in_transaction = true;
        }
    }

    /// Reads after a write in the same transaction must see that write.
    pub fn pins_to_write(&self) -> bool {
        self.in_transaction && self.wrote_in_transaction
    }
}

pub struct ReadwriteGroup {
    pub name: String,
    pub write_data_source: String,
    pub read_data_sources: Vec<String>,
    load_balancer: Arc<dyn LoadBalanceAlgorithm>,
}

impl std::fmt::Debug for ReadwriteGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadwriteGroup")
            .field("name", &self.name)
            .field("write_data_source", &self.write_data_source)
            .field("read_data_sources", &self.read_data_sources)
            .field("load_balancer", &self.load_balancer.type_name())
            .finish()
    }
}

impl ReadwriteGroup {
    /// Actual data source for one statement on this group.
    pub fn resolve(&self, read_only: bool, disabled: &DisabledDataSources) -> String {
        if !read_only || self.read_data_sources.is_empty() {
            return self.write_data_source.clone();
        }
        let enabled: Vec<String> = self
            .read_data_sources
            .iter()
            .filter(|ds| !disabled.contains(ds))
            .cloned()
            .collect();
        match self
            .load_balancer
            .choose(&self.name, &self.write_data_source, &enabled)
        {
            Some(chosen) => chosen.to_string(),
            None => {
                tracing::warn!(
                    group = %self.name,
                    write = %self.write_data_source,
                    "all read data sources disabled, routing read to write data source"
                );
                kestrel_observability::record_replica_fallback(&self.name);
                self.write_data_source.clone()
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ReadwriteSplittingRule {
    groups: BTreeMap<String, ReadwriteGroup>,
}

impl ReadwriteSplittingRule {
    pub fn new(config: &KestrelConfig, registry: &AlgorithmRegistry) -> Result<Self, ConfigError> {
        let rw = &config.readwrite_splitting;
        let mut balancers = BTreeMap::new();
        for (name, algorithm) in &rw.load_balancers {
            balancers.insert(name.as_str(), registry.create_load_balance(algorithm)?);
        }
        let mut groups = BTreeMap::new();
        for (name, group) in &rw.groups {
            if group.read_data_sources.contains(&group.write_data_source) {
                return Err(ConfigError::InvalidReadwriteGroup {
                    group: name.clone(),
                    reason: "write data source is also listed as a read data source".into(),
                });
            }
            let load_balancer: Arc<dyn LoadBalanceAlgorithm> = match &group.load_balancer {
                Some(lb) => balancers
                    .get(lb.as_str())
                    .cloned()
                    .ok_or_else(|| ConfigError::AlgorithmNotDefined(lb.clone()))?,
                None => Arc::new(RoundRobinLoadBalancer::default()),
            };
            groups.insert(
                name.clone(),
                ReadwriteGroup {
                    name: name.clone(),
                    write_data_source: group.write_data_source.clone(),
                    read_data_sources: group.read_data_sources.clone(),
                    load_balancer,
                },
            );
        }
        Ok(Self { groups })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn group(&self, name: &str) -> Option<&ReadwriteGroup> {
        self.groups.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Replace each unit's actual data source. Units sharing a group within
    /// one statement resolve to the same member.
    pub fn apply(
        &self,
        ctx: &mut RouteContext,
        stmt: &BoundStatement,
        hints: &HintValues,
        session: &SessionState,
        disabled: &DisabledDataSources,
    ) {
        if self.groups.is_empty() {
            return;
        }
        let read_only = stmt.is_read_only() && !hints.write_route_only && !session.pins_to_write();
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        for unit in ctx.units_mut() {
            let logic = unit.data_source.logic_name.clone();
            let Some(group) = self.groups.get(&logic) else {
                continue;
            };
            let actual = resolved
                .entry(logic)
                .or_insert_with(|| group.resolve(read_only, disabled));
            unit.data_source.actual_name = actual.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use kestrel_common::config::{AlgorithmConfig, DataSourceConfig, ReadwriteGroupConfig};
    use kestrel_common::props::Props;
    use kestrel_common::statement::StatementKind;

    use super::*;
    use crate::context::{RouteMapper, RouteType, RouteUnit};

    fn config(load_balancer: Option<&str>) -> KestrelConfig {
        let mut config = KestrelConfig::default();
        for name in ["ds_w", "ds_r0", "ds_r1"] {
            config.data_sources.push(DataSourceConfig::named(name));
        }
        config.readwrite_splitting.load_balancers.insert(
            "weighted".into(),
            AlgorithmConfig::new("WEIGHT", Props::new().with("ds_r0", 3).with("ds_r1", 1)),
        );
        config.readwrite_splitting.groups.insert(
            "ds".into(),
            ReadwriteGroupConfig {
                write_data_source: "ds_w".into(),
                read_data_sources: vec!["ds_r0".into(), "ds_r1".into()],
                load_balancer: load_balancer.map(str::to_string),
            },
        );
        config
    }

    fn rule(load_balancer: Option<&str>) -> ReadwriteSplittingRule {
        ReadwriteSplittingRule::new(&config(load_balancer), &AlgorithmRegistry::with_builtins())
            .unwrap()
    }

    fn route(
        rule: &ReadwriteSplittingRule,
        stmt: &BoundStatement,
        session: &SessionState,
        disabled: &DisabledDataSources,
    ) -> String {
        let mut ctx = RouteContext::with_units(
            RouteType::Unicast,
            vec![RouteUnit::new(RouteMapper::identity("ds"), vec![])],
        );
        rule.apply(&mut ctx, stmt, &HintValues::new(), session, disabled);
        ctx.units()[0].data_source.actual_name.clone()
    }

    #[test]
    fn test_round_robin_over_enabled_replicas() {
        let rule = rule(None);
        let select = BoundStatement::new(StatementKind::Select);
        let session = SessionState::default();
        let picks: Vec<String> = (0..4)
            .map(|_| route(&rule, &select, &session, &DisabledDataSources::none()))
            .collect();
        assert_eq!(picks, vec!["ds_r0", "ds_r1", "ds_r0", "ds_r1"]);
    }

    #[test]
    fn test_disabled_replica_excluded() {
        let rule = rule(Some("weighted"));
        let select = BoundStatement::new(StatementKind::Select);
        let disabled = DisabledDataSources::from_names(["ds_r0"]);
        for _ in 0..20 {
            assert_eq!(route(&rule, &select, &SessionState::default(), &disabled), "ds_r1");
        }
    }

    #[test]
    fn test_all_replicas_disabled_falls_back_to_write() {
        let rule = rule(None);
        let select = BoundStatement::new(StatementKind::Select);
        let disabled = DisabledDataSources::from_names(["ds_r0", "ds_r1"]);
        assert_eq!(route(&rule, &select, &SessionState::default(), &disabled), "ds_w");
    }

    #[test]
    fn test_writes_and_locks_go_to_write() {
        let rule = rule(None);
        let none = DisabledDataSources::none();
        let update = BoundStatement::new(StatementKind::Update);
        assert_eq!(route(&rule, &update, &SessionState::default(), &none), "ds_w");
        let mut locking = BoundStatement::new(StatementKind::Select);
        locking.lock = true;
        assert_eq!(route(&rule, &locking, &SessionState::default(), &none), "ds_w");
    }

    #[test]
    fn test_read_after_write_in_transaction() {
        let rule = rule(None);
        let none = DisabledDataSources::none();
        let select = BoundStatement::new(StatementKind::Select);
        let mut session = SessionState::default();
        session.note_write();
        assert!(!session.pins_to_write());
        session.begin();
        assert_ne!(route(&rule, &select, &session, &none), "ds_w");
        session.note_write();
        assert_eq!(route(&rule, &select, &session, &none), "ds_w");
        session.end();
        assert_ne!(route(&rule, &select, &session, &none), "ds_w");
    }

    #[test]
    fn test_write_route_only_hint() {
        let rule = rule(None);
        let select = BoundStatement::new(StatementKind::Select);
        let mut ctx = RouteContext::with_units(
            RouteType::Unicast,
            vec![RouteUnit::new(RouteMapper::identity("ds"), vec![])],
        );
        let mut hints = HintValues::new();
        hints.set_write_route_only();
        rule.apply(
            &mut ctx,
            &select,
            &hints,
            &SessionState::default(),
            &DisabledDataSources::none(),
        );
        assert_eq!(ctx.units()[0].data_source.actual_name, "ds_w");
    }

    #[test]
    fn test_registry_snapshot_is_isolated() {
        let registry = DataSourceStateRegistry::new();
        assert!(registry.disable("ds_r0"));
        assert!(!registry.disable("ds_r0"));
        let snapshot = registry.snapshot();
        assert!(registry.enable("ds_r0"));
        assert!(snapshot.contains("ds_r0"));
        assert!(!registry.is_disabled("ds_r0"));
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_write_listed_as_read_rejected() {
        let mut config = config(None);
        if let Some(group) = config.readwrite_splitting.groups.get_mut("ds") {
            group.read_data_sources.push("ds_w".into());
        }
        let err =
            ReadwriteSplittingRule::new(&config, &AlgorithmRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidReadwriteGroup { .. }));
    }
}
