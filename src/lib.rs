pub mod cleanup;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod domain;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod handlers;
pub mod intent;
pub mod render;
pub mod reparent;
pub mod routing;
pub mod snapshot;
pub mod view_state;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{EditorConfig, NodeDefaults, RouterConfig, load_config};
pub use domain::{DomainEdge, DomainGraph, DomainNode, ROOT_ID};
pub use editor::{DrainReport, Editor, IntentOutcome};
pub use error::EditError;
pub use geometry::{CollisionReport, Geometry, Obstacle, Point, test_edge_collision};
pub use handlers::{Applied, LockLayoutEngine, RenderReason, RenderTrigger, StateRefs};
pub use intent::EditIntent;
pub use render::{RenderFrame, render_frame, render_svg};
pub use routing::{RouteBatch, RouterManager, RoutingEpoch};
pub use snapshot::Snapshot;
pub use view_state::{LayoutMode, RoutingStatus, ViewState};
