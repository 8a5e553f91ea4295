use crate::domain::DomainGraph;
use crate::geometry::Point;
use crate::routing::{build_obstacles, collapse_duplicates};
use crate::view_state::{RoutingStatus, ViewState};
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

const FALLBACK_MESSAGE: &str = "no routed path, drawing a straight line";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFrame {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub is_group: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeFrame {
    pub id: String,
    pub source: String,
    pub target: String,
    pub path: Vec<Point>,
    /// SVG path data for `path`.
    pub d: String,
    pub routing_status: RoutingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Everything a canvas needs to draw one state: world-space node boxes and
/// edge polylines with their routing status.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RenderFrame {
    pub nodes: Vec<NodeFrame>,
    pub edges: Vec<EdgeFrame>,
}

impl RenderFrame {
    pub fn node(&self, id: &str) -> Option<&NodeFrame> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&EdgeFrame> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    /// `(width, height)` of the area covering every node and edge point.
    pub fn extent(&self) -> (f32, f32) {
        let mut max_x: f32 = 0.0;
        let mut max_y: f32 = 0.0;
        for node in &self.nodes {
            max_x = max_x.max(node.x + node.w);
            max_y = max_y.max(node.y + node.h);
        }
        for point in self.edges.iter().flat_map(|edge| edge.path.iter()) {
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }
        (max_x, max_y)
    }
}

pub fn render_frame(domain: &DomainGraph, view: &ViewState) -> RenderFrame {
    let nodes: Vec<NodeFrame> = build_obstacles(domain, view)
        .into_iter()
        .map(|obstacle| NodeFrame {
            is_group: obstacle.members.is_some(),
            id: obstacle.id,
            x: obstacle.rect.x,
            y: obstacle.rect.y,
            w: obstacle.rect.w,
            h: obstacle.rect.h,
        })
        .collect();
    let centers: HashMap<&str, Point> = nodes
        .iter()
        .map(|node| {
            (
                node.id.as_str(),
                Point::new(node.x + node.w / 2.0, node.y + node.h / 2.0),
            )
        })
        .collect();

    let mut edges = Vec::new();
    for edge in domain.edges() {
        let (Some(&source), Some(&target)) = (
            centers.get(edge.source.as_str()),
            centers.get(edge.target.as_str()),
        ) else {
            continue;
        };
        let routed = view.edge.get(&edge.id);
        let waypoints = routed
            .map(|entry| collapse_duplicates(&entry.waypoints))
            .unwrap_or_default();
        let usable = waypoints.len() >= 2 && waypoints.iter().all(|p| p.is_finite());
        let (path, routing_status, message) = if usable {
            (
                waypoints,
                routed.map(|entry| entry.routing_status).unwrap_or_default(),
                routed.and_then(|entry| entry.message.clone()),
            )
        } else {
            let status = match routed.map(|entry| entry.routing_status) {
                Some(RoutingStatus::Error) => RoutingStatus::Error,
                _ => RoutingStatus::Degraded,
            };
            let message = routed
                .and_then(|entry| entry.message.clone())
                .unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
            (vec![source, target], status, Some(message))
        };
        edges.push(EdgeFrame {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            d: points_to_path(&path),
            path,
            routing_status,
            message,
        });
    }

    RenderFrame { nodes, edges }
}

pub fn points_to_path(points: &[Point]) -> String {
    if points.is_empty() {
        return String::new();
    }
    let mut d = String::new();
    d.push_str(&format!("M {:.2} {:.2}", points[0].x, points[0].y));
    for point in points.iter().skip(1) {
        d.push_str(&format!(" L {:.2} {:.2}", point.x, point.y));
    }
    d
}

/// Plain SVG preview of a frame. Degraded and failed routes are dashed.
pub fn render_svg(frame: &RenderFrame) -> String {
    let mut svg = String::new();
    let (extent_x, extent_y) = frame.extent();
    let width = (extent_x + 40.0).max(200.0);
    let height = (extent_y + 40.0).max(200.0);

    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">",
    ));
    svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>");
    svg.push_str("<defs>");
    svg.push_str("<marker id=\"arrow\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" markerWidth=\"6\" markerHeight=\"6\" orient=\"auto-start-reverse\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"#333333\"/></marker>");
    svg.push_str("</defs>");

    for group in frame.nodes.iter().filter(|node| node.is_group) {
        svg.push_str(&format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"10\" ry=\"10\" fill=\"#f4f6fb\" stroke=\"#9aa5b8\" stroke-dasharray=\"6 4\" stroke-width=\"1.2\"/>",
            group.x, group.y, group.w, group.h
        ));
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" font-family=\"sans-serif\" font-size=\"12\" fill=\"#333333\">{}</text>",
            group.x + 12.0,
            group.y + 20.0,
            escape_xml(&group.id)
        ));
    }

    for edge in &frame.edges {
        let (stroke, dash) = match edge.routing_status {
            RoutingStatus::Ok => ("#333333", ""),
            RoutingStatus::Degraded => ("#d98e04", " stroke-dasharray=\"4 3\""),
            RoutingStatus::Error => ("#c62828", " stroke-dasharray=\"4 3\""),
        };
        svg.push_str(&format!(
            "<path d=\"{}\" fill=\"none\" stroke=\"{stroke}\" stroke-width=\"1.4\"{dash} marker-end=\"url(#arrow)\" />",
            edge.d
        ));
    }

    for node in frame.nodes.iter().filter(|node| !node.is_group) {
        svg.push_str(&format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"10\" ry=\"10\" fill=\"#eceffd\" stroke=\"#5b6bbf\" stroke-width=\"1.4\"/>",
            node.x, node.y, node.w, node.h
        ));
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"12\" fill=\"#333333\">{}</text>",
            node.x + node.w / 2.0,
            node.y + node.h / 2.0 + 4.0,
            escape_xml(&node.id)
        ));
    }

    svg.push_str("</svg>");
    svg
}

pub fn write_output(contents: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, contents)?;
        }
        None => {
            print!("{}", contents);
        }
    }
    Ok(())
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainEdge, DomainNode, ROOT_ID};
    use crate::geometry::Geometry;
    use crate::view_state::EdgeView;

    fn scene() -> (DomainGraph, ViewState) {
        let mut domain = DomainGraph::new();
        domain.insert_node(ROOT_ID, DomainNode::new("a")).unwrap();
        domain.insert_node(ROOT_ID, DomainNode::new("b")).unwrap();
        domain.add_edge(ROOT_ID, DomainEdge::new("e", "a", "b")).unwrap();
        let mut view = ViewState::new();
        view.node.insert("a".into(), Geometry::new(0.0, 0.0, 100.0, 100.0));
        view.node.insert("b".into(), Geometry::new(300.0, 0.0, 100.0, 100.0));
        (domain, view)
    }

    #[test]
    fn missing_route_falls_back_to_center_line() {
        let (domain, view) = scene();
        let frame = render_frame(&domain, &view);
        let edge = frame.edge("e").unwrap();
        assert_eq!(edge.routing_status, RoutingStatus::Degraded);
        assert_eq!(edge.path, vec![Point::new(50.0, 50.0), Point::new(350.0, 50.0)]);
        assert_eq!(edge.d, "M 50.00 50.00 L 350.00 50.00");
        assert!(edge.message.is_some());
    }

    #[test]
    fn routed_waypoints_pass_through() {
        let (domain, mut view) = scene();
        let waypoints = vec![Point::new(100.0, 50.0), Point::new(300.0, 50.0)];
        view.edge.insert(
            "e".into(),
            EdgeView {
                waypoints: waypoints.clone(),
                routing_status: RoutingStatus::Ok,
                message: None,
            },
        );
        let frame = render_frame(&domain, &view);
        assert_eq!(frame.edge("e").unwrap().path, waypoints);
        assert_eq!(frame.edge("e").unwrap().routing_status, RoutingStatus::Ok);
        assert_eq!(frame.node("b").unwrap().x, 300.0);
    }

    #[test]
    fn failed_route_keeps_error_status_on_fallback() {
        let (domain, mut view) = scene();
        view.edge.insert(
            "e".into(),
            EdgeView {
                waypoints: vec![Point::new(10.0, 10.0)],
                routing_status: RoutingStatus::Error,
                message: Some("boom".into()),
            },
        );
        let frame = render_frame(&domain, &view);
        let edge = frame.edge("e").unwrap();
        assert_eq!(edge.routing_status, RoutingStatus::Error);
        assert_eq!(edge.message.as_deref(), Some("boom"));
        assert_eq!(edge.path.len(), 2);
    }

    #[test]
    fn svg_marks_degraded_routes() {
        let (domain, view) = scene();
        let svg = render_svg(&render_frame(&domain, &view));
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("stroke-dasharray=\"4 3\""));
        assert!(svg.contains(">a</text>"));
    }
}
