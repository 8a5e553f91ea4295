use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cleanup::clean_view_state;
use crate::domain::DomainGraph;
use crate::error::EditError;
use crate::view_state::ViewState;

/// Persisted editor state. Storage is up to the caller; this is only the
/// serialised shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub domain: DomainGraph,
    #[serde(default)]
    pub view: ViewState,
}

impl Snapshot {
    pub fn new(domain: DomainGraph, view: ViewState) -> Self {
        Self { domain, view }
    }

    /// Re-checks the tree (unique ids, live edge endpoints), drops view
    /// entries with no domain counterpart and requires valid geometry for
    /// every node. Missing group entries are filled from the node entry;
    /// conflicting ones are rejected.
    pub fn validated(self) -> Result<Self> {
        let domain = DomainGraph::from_root(self.domain.root().clone())
            .context("snapshot domain graph is inconsistent")?;
        let mut view = clean_view_state(&domain, &self.view);
        check_geometry(&domain, &mut view).context("snapshot view state is inconsistent")?;
        Ok(Self { domain, view })
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(contents).context("failed to parse snapshot JSON")?;
        snapshot.validated()
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

fn check_geometry(domain: &DomainGraph, view: &mut ViewState) -> std::result::Result<(), EditError> {
    let mut missing = Vec::new();
    let mut mismatched = Vec::new();
    for id in domain.node_ids() {
        let Some(geometry) = view.node.get(&id).copied().filter(|g| g.is_valid()) else {
            missing.push(id);
            continue;
        };
        if !domain.is_group(&id) {
            continue;
        }
        match view.group.get(&id) {
            Some(mirror) if *mirror != geometry => mismatched.push(id),
            Some(_) => {}
            None => view.ensure_group_entry(&id),
        }
    }
    if !missing.is_empty() {
        return Err(EditError::MissingGeometry { node_ids: missing });
    }
    if !mismatched.is_empty() {
        return Err(EditError::GroupMirrorMismatch {
            group_ids: mismatched,
        });
    }
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    Snapshot::from_json(&contents).with_context(|| format!("invalid snapshot {}", path.display()))
}

pub fn save_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let json = snapshot.to_json(true)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write snapshot {}", path.display()))
}
