#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("edit intent is missing a node or edge id")]
    MissingId,
    #[error("addNode `{node_id}` has no position; nodes are never placed implicitly")]
    MissingPosition { node_id: String },
    #[error(
        "domain mutation for `{node_id}` left `{parent_id}` with {actual} children, expected {expected}"
    )]
    MutationIntegrity {
        node_id: String,
        parent_id: String,
        expected: usize,
        actual: usize,
    },
    #[error("geometry for `{node_id}` was discarded by view state cleanup")]
    GeometryLost { node_id: String },
    #[error("unknown node `{0}`")]
    UnknownNode(String),
    #[error("unknown edge `{0}`")]
    UnknownEdge(String),
    #[error("id `{0}` is already in use")]
    DuplicateId(String),
    #[error("cannot move `{node_id}` under `{new_parent_id}`: that is the node itself or one of its descendants")]
    InvalidReparent {
        node_id: String,
        new_parent_id: String,
    },
    #[error("the root node cannot be deleted or moved")]
    RootImmutable,
    #[error("`{node_id}` is laid out by locked group `{group_id}`")]
    LockedGeometry { node_id: String, group_id: String },
    #[error("invalid geometry for `{node_id}`: width and height must be positive and finite")]
    InvalidGeometry { node_id: String },
    #[error("nodes without valid geometry: {}", .node_ids.join(", "))]
    MissingGeometry { node_ids: Vec<String> },
    #[error("group entries disagree with their node geometry: {}", .group_ids.join(", "))]
    GroupMirrorMismatch { group_ids: Vec<String> },
}

impl EditError {
    /// Caller bugs: the intent itself was malformed or referenced nothing.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingId
                | Self::MissingPosition { .. }
                | Self::UnknownNode(_)
                | Self::UnknownEdge(_)
                | Self::DuplicateId(_)
                | Self::InvalidReparent { .. }
                | Self::RootImmutable
                | Self::LockedGeometry { .. }
                | Self::InvalidGeometry { .. }
        )
    }

    /// The domain graph and view state drifted apart. Nothing was committed.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::MutationIntegrity { .. }
                | Self::GeometryLost { .. }
                | Self::MissingGeometry { .. }
                | Self::GroupMirrorMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EditError>;
