use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{EditorConfig, NodeDefaults};
use crate::domain::DomainGraph;
use crate::error::Result;
use crate::handlers::{
    self, Applied, LockLayoutEngine, RecordingTrigger, RenderReason, StateRefs,
};
use crate::intent::EditIntent;
use crate::render::{RenderFrame, render_frame};
use crate::routing::{EdgeRequest, RouteBatch, RouterManager, build_obstacles};
use crate::snapshot::Snapshot;
use crate::view_state::ViewState;

/// Runs one intent through its handler.
pub fn apply_intent(
    refs: &mut StateRefs<'_>,
    intent: EditIntent,
    defaults: &NodeDefaults,
) -> Result<Applied> {
    match intent {
        EditIntent::AddNode(intent) => handlers::add_node(refs, intent, defaults),
        EditIntent::DeleteNode(intent) => handlers::delete_node(refs, intent),
        EditIntent::MoveNode(intent) => handlers::move_node(refs, intent),
        EditIntent::AddEdge(intent) => handlers::add_edge(refs, intent),
        EditIntent::DeleteEdge(intent) => handlers::delete_edge(refs, intent),
        EditIntent::SetGeometry(intent) => handlers::set_geometry(refs, intent),
        EditIntent::SetLayoutMode(intent) => handlers::set_layout_mode(refs, intent),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentOutcome {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<Applied>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub outcomes: Vec<IntentOutcome>,
    /// Edges routed after the edits, or `None` when nothing changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed: Option<usize>,
}

/// Single-consumer editor: intents queue up and are applied strictly one at
/// a time, then every live edge is rerouted in one batch.
pub struct Editor {
    domain: DomainGraph,
    view: ViewState,
    router: RouterManager,
    config: EditorConfig,
    lock_layout: Option<Box<dyn LockLayoutEngine>>,
    queue: VecDeque<EditIntent>,
    renders: RecordingTrigger,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("domain", &self.domain)
            .field("view", &self.view)
            .field("router", &self.router)
            .field("config", &self.config)
            .field("lock_layout", &self.lock_layout.is_some())
            .field("queue", &self.queue)
            .field("renders", &self.renders)
            .finish()
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            domain: DomainGraph::new(),
            view: ViewState::new(),
            router: RouterManager::new(config.router.clone()),
            config,
            lock_layout: None,
            queue: VecDeque::new(),
            renders: RecordingTrigger::default(),
        }
    }

    /// Starts from persisted state and routes it once. The snapshot is
    /// validated first, so a graph with unplaced nodes never loads.
    pub fn from_snapshot(snapshot: Snapshot, config: EditorConfig) -> anyhow::Result<Self> {
        let snapshot = snapshot.validated()?;
        let mut editor = Self::new(config);
        editor.domain = snapshot.domain;
        editor.view = snapshot.view;
        editor.reroute();
        Ok(editor)
    }

    pub fn with_lock_layout(mut self, engine: Box<dyn LockLayoutEngine>) -> Self {
        self.lock_layout = Some(engine);
        self
    }

    pub fn domain(&self) -> &DomainGraph {
        &self.domain
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn router(&self) -> &RouterManager {
        &self.router
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EditorConfig) {
        self.router.set_config(config.router.clone());
        self.config = config;
        self.reroute();
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.domain.clone(), self.view.clone())
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn submit(&mut self, intent: EditIntent) {
        self.queue.push_back(intent);
    }

    /// Render requests since the last call, in order.
    pub fn take_renders(&mut self) -> Vec<RenderReason> {
        std::mem::take(&mut self.renders.renders)
    }

    pub fn selected(&self) -> Option<&str> {
        self.renders.selected.as_deref()
    }

    /// Applies one intent immediately and reroutes.
    pub fn apply(&mut self, intent: EditIntent) -> Result<Applied> {
        let result = self.apply_one(intent);
        if matches!(result, Ok(Applied::Changed)) {
            self.reroute();
        }
        result
    }

    /// Applies every queued intent in submission order. A rejected intent
    /// leaves the state untouched and does not stop the ones after it.
    pub fn drain(&mut self) -> DrainReport {
        let mut outcomes = Vec::with_capacity(self.queue.len());
        let mut changed = false;
        while let Some(intent) = self.queue.pop_front() {
            let kind = intent.kind();
            let target = intent.target_id().map(str::to_string);
            match self.apply_one(intent) {
                Ok(applied) => {
                    changed |= applied == Applied::Changed;
                    outcomes.push(IntentOutcome {
                        kind,
                        target,
                        applied: Some(applied),
                        error: None,
                    });
                }
                Err(err) => {
                    if err.is_precondition() {
                        warn!(intent = kind, target = ?target, error = %err, "edit rejected");
                    }
                    outcomes.push(IntentOutcome {
                        kind,
                        target,
                        applied: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        let routed = changed.then(|| self.reroute());
        DrainReport { outcomes, routed }
    }

    fn apply_one(&mut self, intent: EditIntent) -> Result<Applied> {
        let mut refs = StateRefs {
            domain: &mut self.domain,
            view: &mut self.view,
            render: &mut self.renders,
            lock_layout: self.lock_layout.as_deref(),
        };
        apply_intent(&mut refs, intent, &self.config.defaults)
    }

    /// Routes every domain edge against the current geometry and writes the
    /// result into the ViewState. Returns the number of routed edges.
    pub fn reroute(&mut self) -> usize {
        let batch = self.route_batch();
        let count = batch.len();
        if self.router.apply_routes(&batch, &mut self.view) {
            debug!(edges = count, epoch = batch.epoch.0, "routes applied");
        }
        count
    }

    /// Computes routes without writing them anywhere.
    pub fn route_batch(&mut self) -> RouteBatch {
        self.router.sync(build_obstacles(&self.domain, &self.view));
        let requests: Vec<EdgeRequest> = self
            .domain
            .edges()
            .into_iter()
            .map(|edge| EdgeRequest::new(edge.id.clone(), edge.source.clone(), edge.target.clone()))
            .collect();
        self.router.route_all(requests)
    }

    pub fn frame(&self) -> RenderFrame {
        render_frame(&self.domain, &self.view)
    }
}
