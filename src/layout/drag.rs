use eframe::egui::{Vec2, vec2};

use super::{SimLink, SimNode};
use crate::config::LayoutConfig;

#[derive(Clone, Copy, Debug)]
struct DragAnchor {
    index: usize,
    angle: f32,
    distance: f32,
}

#[derive(Clone, Debug)]
pub(super) struct DragSession {
    pub(super) node: usize,
    pub(super) start: Vec2,
    pub(super) was_locked: bool,
    anchors: Vec<DragAnchor>,
}

impl DragSession {
    pub(super) fn begin(nodes: &[SimNode], links: &[SimLink], node: usize) -> Self {
        let dragged = &nodes[node];
        let mut anchors = Vec::new();

        if dragged.is_main {
            for link in links {
                let other = if link.source == node {
                    link.target
                } else if link.target == node {
                    link.source
                } else {
                    continue;
                };

                let Some(counterparty) = nodes.get(other) else {
                    continue;
                };
                if counterparty.is_main
                    || counterparty.locked
                    || anchors.iter().any(|anchor: &DragAnchor| anchor.index == other)
                {
                    continue;
                }

                let offset = counterparty.position - dragged.position;
                let distance = offset.length();
                if distance <= 0.0001 {
                    continue;
                }
                anchors.push(DragAnchor {
                    index: other,
                    angle: offset.y.atan2(offset.x),
                    distance,
                });
            }
        }

        Self {
            node,
            start: dragged.position,
            was_locked: dragged.locked,
            anchors,
        }
    }

    pub(super) fn rebind(&self, nodes: &[SimNode], links: &[SimLink], node: usize) -> Self {
        Self {
            start: self.start,
            was_locked: self.was_locked,
            ..Self::begin(nodes, links, node)
        }
    }

    pub(super) fn anchored_count(&self) -> usize {
        self.anchors.len()
    }

    /// Nudges recorded counterparties toward their original offset from the
    /// dragged main, harder once they trail past the stretch limit.
    pub(super) fn apply_follow(
        &self,
        nodes: &[SimNode],
        config: &LayoutConfig,
        deltas: &mut [Vec2],
    ) {
        let Some(main) = nodes.get(self.node) else {
            return;
        };

        for anchor in &self.anchors {
            let Some(counterparty) = nodes.get(anchor.index) else {
                continue;
            };
            if counterparty.locked || counterparty.pinned.is_some() {
                continue;
            }

            let target =
                main.position + vec2(anchor.angle.cos(), anchor.angle.sin()) * anchor.distance;
            let mut correction = (target - counterparty.position) * config.drag_follow;

            let stretch = (counterparty.position - main.position).length();
            if stretch > anchor.distance * config.drag_stretch_limit {
                let inward = (main.position - counterparty.position) / stretch;
                correction +=
                    inward * (stretch - anchor.distance) * config.drag_stretch_follow;
            }
            deltas[anchor.index] += correction;
        }
    }

    pub(super) fn displacement(&self, position: Vec2) -> f32 {
        (position - self.start).length()
    }
}
