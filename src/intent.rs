use serde::{Deserialize, Serialize};

use crate::handlers::{AddEdge, AddNode, DeleteEdge, DeleteNode, MoveNode, SetGeometry, SetLayoutMode};

/// One user or agent edit. On the wire this is the payload object with a
/// `type` tag, e.g. `{"type": "deleteNode", "nodeId": "n1"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditIntent {
    AddNode(AddNode),
    DeleteNode(DeleteNode),
    MoveNode(MoveNode),
    AddEdge(AddEdge),
    DeleteEdge(DeleteEdge),
    SetGeometry(SetGeometry),
    SetLayoutMode(SetLayoutMode),
}

impl EditIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddNode(_) => "addNode",
            Self::DeleteNode(_) => "deleteNode",
            Self::MoveNode(_) => "moveNode",
            Self::AddEdge(_) => "addEdge",
            Self::DeleteEdge(_) => "deleteEdge",
            Self::SetGeometry(_) => "setGeometry",
            Self::SetLayoutMode(_) => "setLayoutMode",
        }
    }

    /// The node, group or edge the intent is about, when it names one.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::AddNode(intent) => intent.node_id.as_deref(),
            Self::DeleteNode(intent) => intent.node_id.as_deref(),
            Self::MoveNode(intent) => intent.node_id.as_deref(),
            Self::AddEdge(intent) => intent.edge_id.as_deref(),
            Self::DeleteEdge(intent) => intent.edge_id.as_deref(),
            Self::SetGeometry(intent) => intent.node_id.as_deref(),
            Self::SetLayoutMode(intent) => intent.group_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::view_state::LayoutMode;

    #[test]
    fn parses_tagged_intents() {
        let raw = r#"[
            {"type": "addNode", "nodeId": "n1", "parentId": "", "position": {"x": 100, "y": 100}},
            {"type": "moveNode", "nodeId": "n1", "newParentId": "g", "oldParentId": null},
            {"type": "addEdge", "edgeId": "e", "source": "n1", "target": "n2"},
            {"type": "setGeometry", "nodeId": "n1", "geometry": {"x": 1, "y": 2, "w": 3, "h": 4}},
            {"type": "setLayoutMode", "groupId": "g", "mode": "LOCK"}
        ]"#;
        let intents: Vec<EditIntent> = serde_json::from_str(raw).unwrap();
        assert_eq!(intents.len(), 5);
        match &intents[0] {
            EditIntent::AddNode(add) => {
                assert_eq!(add.node_id.as_deref(), Some("n1"));
                assert_eq!(add.position.unwrap().x, Some(100.0));
                assert!(add.size.is_none());
            }
            other => panic!("unexpected intent {other:?}"),
        }
        assert_eq!(intents[1].kind(), "moveNode");
        assert_eq!(intents[2].target_id(), Some("e"));
        match &intents[3] {
            EditIntent::SetGeometry(set) => assert_eq!(set.geometry, Geometry::new(1.0, 2.0, 3.0, 4.0)),
            other => panic!("unexpected intent {other:?}"),
        }
        match &intents[4] {
            EditIntent::SetLayoutMode(set) => assert_eq!(set.mode, LayoutMode::Lock),
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[test]
    fn missing_ids_still_parse() {
        let intent: EditIntent = serde_json::from_str(r#"{"type": "deleteNode"}"#).unwrap();
        assert_eq!(intent.target_id(), None);
    }
}
