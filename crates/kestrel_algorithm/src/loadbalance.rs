//! Read replica selection for read-write splitting groups.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use kestrel_common::error::ConfigError;
use kestrel_common::props::Props;

/// Picks one read data source of a group. `read_nodes` holds only enabled
/// replicas; an empty slice yields `None` and the caller falls back to the
/// write node.
pub trait LoadBalanceAlgorithm: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn choose<'a>(
        &self,
        group_name: &str,
        write_node: &str,
        read_nodes: &'a [String],
    ) -> Option<&'a str>;
}

#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    next: AtomicUsize,
}

impl RoundRobinLoadBalancer {
    pub const TYPE: &'static str = "ROUND_ROBIN";

    pub fn new(_props: &Props) -> Result<Self, ConfigError> {
        Ok(Self::default())
    }
}

impl LoadBalanceAlgorithm for RoundRobinLoadBalancer {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn choose<'a>(
        &self,
        _group_name: &str,
        _write_node: &str,
        read_nodes: &'a [String],
    ) -> Option<&'a str> {
        if read_nodes.is_empty() {
            return None;
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Some(read_nodes[n % read_nodes.len()].as_str())
    }
}

/// `WEIGHT`: props map a read data source name to its relative weight;
/// unlisted replicas weigh 1. Selection walks a low-discrepancy sequence over
/// the cumulative weights, so over any window the share of each replica
/// tracks its weight without a random source.
#[derive(Debug)]
pub struct WeightLoadBalancer {
    weights: BTreeMap<String, f64>,
    counter: AtomicUsize,
}

impl WeightLoadBalancer {
    pub const TYPE: &'static str = "WEIGHT";
    const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;

    pub fn new(props: &Props) -> Result<Self, ConfigError> {
        let mut weights = BTreeMap::new();
        for (name, _) in props.iter() {
            let weight = props.get_f64(Self::TYPE, name)?.unwrap_or(1.0);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidProperty {
                    algorithm: Self::TYPE.to_string(),
                    key: name.to_string(),
                    reason: "weight must be a non-negative number".to_string(),
                });
            }
            weights.insert(name.to_string(), weight);
        }
        Ok(Self {
            weights,
            counter: AtomicUsize::new(0),
        })
    }

    fn weight_of(&self, node: &str) -> f64 {
        self.weights.get(node).copied().unwrap_or(1.0)
    }
}

impl LoadBalanceAlgorithm for WeightLoadBalancer {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn choose<'a>(
        &self,
        _group_name: &str,
        _write_node: &str,
        read_nodes: &'a [String],
    ) -> Option<&'a str> {
        let total: f64 = read_nodes.iter().map(|n| self.weight_of(n)).sum();
        if read_nodes.is_empty() || total <= 0.0 {
            return read_nodes.first().map(String::as_str);
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let point = ((n as f64 + 1.0) * Self::GOLDEN_RATIO_CONJUGATE).fract() * total;
        let mut cumulative = 0.0;
        for node in read_nodes {
            cumulative += self.weight_of(node);
            if point < cumulative {
                return Some(node.as_str());
            }
        }
        read_nodes.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_round_robin_rotates() {
        let lb = RoundRobinLoadBalancer::default();
        let reads = nodes(&["r0", "r1"]);
        let picks: Vec<&str> = (0..4).map(|_| lb.choose("g", "w", &reads).unwrap()).collect();
        assert_eq!(picks, vec!["r0", "r1", "r0", "r1"]);
        assert!(lb.choose("g", "w", &[]).is_none());
    }

    #[test]
    fn test_weight_follows_proportions() {
        let lb = WeightLoadBalancer::new(&Props::new().with("r0", 3).with("r1", 1)).unwrap();
        let reads = nodes(&["r0", "r1"]);
        let mut r0 = 0;
        for _ in 0..1000 {
            if lb.choose("g", "w", &reads) == Some("r0") {
                r0 += 1;
            }
        }
        assert!((700..=800).contains(&r0), "r0 picked {r0} times");
    }

    #[test]
    fn test_weight_zero_never_chosen() {
        let lb = WeightLoadBalancer::new(&Props::new().with("r0", 0).with("r1", 2)).unwrap();
        let reads = nodes(&["r0", "r1"]);
        for _ in 0..50 {
            assert_eq!(lb.choose("g", "w", &reads), Some("r1"));
        }
    }

    #[test]
    fn test_weight_rejects_negative() {
        assert!(WeightLoadBalancer::new(&Props::new().with("r0", -1)).is_err());
    }
}
