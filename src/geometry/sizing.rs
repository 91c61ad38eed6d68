use crate::config::LayoutConfig;
use crate::flow::{FlowGraph, FlowNode, SizeMetric};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeSizing {
    pub metric: SizeMetric,
    /// Compression applied above the damping threshold; `0` disables it.
    pub damping: f32,
}

impl Default for NodeSizing {
    fn default() -> Self {
        Self {
            metric: SizeMetric::NetFlow,
            damping: 0.0,
        }
    }
}

pub fn normalize_log(value: f64, min: f64, max: f64) -> f32 {
    let min = min.max(0.0).ln_1p();
    let max = max.max(0.0).ln_1p();
    let value = value.max(0.0).ln_1p();

    let denominator = max - min;
    if !denominator.is_finite() || denominator.abs() < f64::EPSILON {
        return 0.5;
    }

    ((value - min) / denominator).clamp(0.0, 1.0) as f32
}

pub fn damp_radius(radius: f32, threshold: f32, factor: f32) -> f32 {
    if factor <= 0.0 || threshold <= 0.0 || radius <= threshold {
        return radius;
    }
    let excess = radius - threshold;
    threshold + excess / (1.0 + factor * excess / threshold)
}

pub fn node_radius(
    node: &FlowNode,
    sizing: NodeSizing,
    range: (f64, f64),
    config: &LayoutConfig,
) -> f32 {
    if node.is_main {
        return config.main_radius;
    }

    let raw = match sizing.metric {
        SizeMetric::Uniform => (config.min_radius + config.max_radius) * 0.5,
        metric => {
            let t = normalize_log(node.metric(metric), range.0, range.1);
            config.min_radius + t * (config.max_radius - config.min_radius)
        }
    };
    damp_radius(raw, config.size_damping_threshold, sizing.damping)
}

pub fn radii_for(graph: &FlowGraph, sizing: NodeSizing, config: &LayoutConfig) -> Vec<f32> {
    let range = graph.metric_range(sizing.metric);
    graph
        .nodes
        .iter()
        .map(|node| node_radius(node, sizing, range, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counterparty(net: f64) -> FlowNode {
        let mut node = FlowNode::new("0xC", false);
        node.net_usd_flow = net;
        node.volume_in = net.max(0.0);
        node.volume_out = (-net).max(0.0);
        node
    }

    #[test]
    fn log_normalization_spans_the_range() {
        assert_eq!(normalize_log(10.0, 10.0, 10_000.0), 0.0);
        assert_eq!(normalize_log(10_000.0, 10.0, 10_000.0), 1.0);
        let middle = normalize_log(316.0, 10.0, 10_000.0);
        assert!(middle > 0.45 && middle < 0.55);
        assert_eq!(normalize_log(5.0, 7.0, 7.0), 0.5);
    }

    #[test]
    fn damping_only_applies_above_threshold() {
        assert_eq!(damp_radius(20.0, 24.0, 2.0), 20.0);
        assert_eq!(damp_radius(40.0, 24.0, 0.0), 40.0);

        let damped = damp_radius(48.0, 24.0, 1.0);
        assert!((damped - 36.0).abs() < 1e-4);
        assert!(damp_radius(48.0, 24.0, 3.0) < damped);
    }

    #[test]
    fn mains_use_fixed_radius_and_metric_orders_counterparties() {
        let config = LayoutConfig::default();
        let sizing = NodeSizing::default();
        let main = FlowNode::new("0xA", true);
        assert_eq!(node_radius(&main, sizing, (1.0, 1e6), &config), config.main_radius);

        let small = node_radius(&counterparty(-50.0), sizing, (50.0, 50_000.0), &config);
        let large = node_radius(&counterparty(50_000.0), sizing, (50.0, 50_000.0), &config);
        assert_eq!(small, config.min_radius);
        assert_eq!(large, config.max_radius);

        let uniform = NodeSizing {
            metric: SizeMetric::Uniform,
            damping: 0.0,
        };
        assert_eq!(
            node_radius(&counterparty(-50.0), uniform, (0.0, 0.0), &config),
            node_radius(&counterparty(50_000.0), uniform, (0.0, 0.0), &config)
        );
    }
}
