use std::fmt::Write as _;

use eframe::egui::{Vec2, vec2};

use crate::config::LayoutConfig;
use crate::layout::{SimLink, SimNode};

const EPSILON: f32 = 0.0001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LinkPath {
    Line { from: Vec2, to: Vec2 },
    Quadratic { from: Vec2, control: Vec2, to: Vec2 },
}

impl LinkPath {
    pub fn start(&self) -> Vec2 {
        match *self {
            Self::Line { from, .. } | Self::Quadratic { from, .. } => from,
        }
    }

    pub fn end(&self) -> Vec2 {
        match *self {
            Self::Line { to, .. } | Self::Quadratic { to, .. } => to,
        }
    }

    pub fn point_at(&self, t: f32) -> Vec2 {
        match *self {
            Self::Line { from, to } => from + (to - from) * t,
            Self::Quadratic { from, control, to } => {
                let inverse = 1.0 - t;
                from * (inverse * inverse) + control * (2.0 * inverse * t) + to * (t * t)
            }
        }
    }

    pub fn end_tangent(&self) -> Vec2 {
        match *self {
            Self::Line { from, to } => to - from,
            Self::Quadratic { control, to, .. } => to - control,
        }
    }

    pub fn to_svg(&self) -> String {
        let mut path = String::new();
        match *self {
            Self::Line { from, to } => {
                let _ = write!(path, "M {:.2} {:.2} L {:.2} {:.2}", from.x, from.y, to.x, to.y);
            }
            Self::Quadratic { from, control, to } => {
                let _ = write!(
                    path,
                    "M {:.2} {:.2} Q {:.2} {:.2} {:.2} {:.2}",
                    from.x, from.y, control.x, control.y, to.x, to.y
                );
            }
        }
        path
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arrowhead {
    pub tip: Vec2,
    pub left: Vec2,
    pub right: Vec2,
}

impl Arrowhead {
    pub fn to_svg(&self) -> String {
        format!(
            "M {:.2} {:.2} L {:.2} {:.2} L {:.2} {:.2} Z",
            self.left.x, self.left.y, self.tip.x, self.tip.y, self.right.x, self.right.y
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkGeometry {
    pub path: LinkPath,
    pub arrow: Option<Arrowhead>,
}

fn is_finite(point: Vec2) -> bool {
    point.x.is_finite() && point.y.is_finite()
}

pub fn boundary_arc(
    from: Vec2,
    from_radius: f32,
    to: Vec2,
    to_radius: f32,
    curvature: f32,
) -> Option<LinkPath> {
    let delta = to - from;
    let distance = delta.length();
    if distance <= from_radius + to_radius + EPSILON {
        return None;
    }

    let direction = delta / distance;
    let start = from + direction * from_radius;
    let end = to - direction * to_radius;
    let chord = (end - start).length();
    let control = (start + end) * 0.5 + direction.rot90() * (chord * curvature);

    Some(LinkPath::Quadratic {
        from: start,
        control,
        to: end,
    })
}

pub fn fan_offset(index: usize, total: usize, spread: f32) -> f32 {
    if total <= 1 {
        return 0.0;
    }
    spread * (index as f32 / (total - 1) as f32 - 0.5)
}

pub fn fanned_arc(from: Vec2, to: Vec2, offset: f32) -> Option<LinkPath> {
    let delta = to - from;
    let distance = delta.length();
    if distance <= EPSILON {
        return None;
    }

    let normal = (delta / distance).rot90();
    Some(LinkPath::Quadratic {
        from,
        control: (from + to) * 0.5 + normal * offset,
        to,
    })
}

pub fn arrowhead(path: &LinkPath, length: f32) -> Option<Arrowhead> {
    let tangent = path.end_tangent();
    let magnitude = tangent.length();
    if magnitude <= EPSILON || length <= 0.0 {
        return None;
    }

    let direction = tangent / magnitude;
    let tip = path.end();
    let base = tip - direction * length;
    let wing = direction.rot90() * (length * 0.5);
    Some(Arrowhead {
        tip,
        left: base + wing,
        right: base - wing,
    })
}

pub fn link_geometry(
    nodes: &[SimNode],
    link: &SimLink,
    config: &LayoutConfig,
) -> Option<LinkGeometry> {
    let source = nodes.get(link.source)?;
    let target = nodes.get(link.target)?;
    let (from, to) = (source.position, target.position);
    if !is_finite(from) || !is_finite(to) {
        return None;
    }

    let line = LinkPath::Line { from, to };
    let geometry = if let Some(slot) = link.fan {
        let offset = fan_offset(slot.index, slot.total, config.fan_spread);
        LinkGeometry {
            path: fanned_arc(from, to, offset).unwrap_or(line),
            arrow: None,
        }
    } else if link.between_mains {
        match boundary_arc(from, source.radius, to, target.radius, config.curvature) {
            Some(path) => LinkGeometry {
                arrow: arrowhead(&path, config.arrow_length),
                path,
            },
            None => LinkGeometry { path: line, arrow: None },
        }
    } else {
        LinkGeometry { path: line, arrow: None }
    };
    Some(geometry)
}

/// Geometry for every link, in link order; links with missing endpoints yield `None`.
pub fn link_geometries(
    nodes: &[SimNode],
    links: &[SimLink],
    config: &LayoutConfig,
) -> Vec<Option<LinkGeometry>> {
    links
        .iter()
        .map(|link| link_geometry(nodes, link, config))
        .collect()
}
