mod curves;
mod sizing;

pub use curves::{
    Arrowhead, LinkGeometry, LinkPath, arrowhead, boundary_arc, fan_offset, fanned_arc,
    link_geometries, link_geometry,
};
pub use sizing::{NodeSizing, damp_radius, node_radius, normalize_log, radii_for};
