use canvas_router::config::parse_config;
use canvas_router::{EditIntent, Editor, EditorConfig, Snapshot};
use serde::Serialize;
use wasm_bindgen::prelude::*;

fn to_js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplyResult {
    applied: bool,
    renders: usize,
}

/// Editor handle for the browser canvas. Every call is synchronous; the JS
/// side is the single consumer of the intent stream.
#[wasm_bindgen]
pub struct EditorSession {
    editor: Editor,
}

#[wasm_bindgen]
impl EditorSession {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<EditorSession, JsValue> {
        Ok(Self {
            editor: Editor::new(session_config(config_json)?),
        })
    }

    #[wasm_bindgen(js_name = fromSnapshot)]
    pub fn from_snapshot(
        snapshot_json: &str,
        config_json: Option<String>,
    ) -> Result<EditorSession, JsValue> {
        let snapshot = Snapshot::from_json(snapshot_json).map_err(|error| to_js_error(format!("{error:#}")))?;
        let editor = Editor::from_snapshot(snapshot, session_config(config_json)?)
            .map_err(|error| to_js_error(format!("{error:#}")))?;
        Ok(Self { editor })
    }

    /// Applies one intent (JSON with a `type` tag) and reroutes.
    pub fn apply(&mut self, intent_json: &str) -> Result<String, JsValue> {
        let intent: EditIntent = serde_json::from_str(intent_json).map_err(to_js_error)?;
        let applied = self.editor.apply(intent).map_err(to_js_error)?;
        let result = ApplyResult {
            applied: applied == canvas_router::Applied::Changed,
            renders: self.editor.take_renders().len(),
        };
        serde_json::to_string(&result).map_err(to_js_error)
    }

    /// Current render frame as JSON.
    pub fn frame(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.editor.frame()).map_err(to_js_error)
    }

    pub fn svg(&self) -> String {
        canvas_router::render_svg(&self.editor.frame())
    }

    pub fn snapshot(&self) -> Result<String, JsValue> {
        self.editor
            .snapshot()
            .to_json(false)
            .map_err(|error| to_js_error(format!("{error:#}")))
    }
}

fn session_config(config_json: Option<String>) -> Result<EditorConfig, JsValue> {
    match config_json {
        Some(raw) => parse_config(&raw, false).map_err(|error| to_js_error(format!("{error:#}"))),
        None => Ok(EditorConfig::default()),
    }
}
