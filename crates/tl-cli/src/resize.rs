//! The `convert_and_text` step: sepia, caption, PNG at 80% quality.

use std::path::PathBuf;

use serde_json::{json, Map, Value};

pub const STEP_NAME: &str = "convert_and_text";
pub const STEP_ROBOT: &str = "/image/resize";

/// Caption drawn onto every image.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub text: String,
    pub color: String,
    pub font: String,
    pub size: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            text: "Rust Example".to_string(),
            color: "#e61010".to_string(),
            font: "Helvetica".to_string(),
            size: 15,
        }
    }
}

/// Bundled sample images, located relative to this crate.
pub fn sample_images() -> Vec<PathBuf> {
    let assets = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets");
    vec![assets.join("lol_cat.png"), assets.join("mona_lisa.png")]
}

/// Robot options of the step.
pub fn step_options(caption: &CaptionStyle) -> Map<String, Value> {
    let mut options = Map::new();
    options.insert("format".to_string(), json!("png"));
    options.insert("quality".to_string(), json!(80));
    options.insert("sepia".to_string(), json!(95));
    options.insert(
        "text".to_string(),
        json!([{
            "text": caption.text,
            "color": caption.color,
            "font": caption.font,
            "size": caption.size,
        }]),
    );
    options
}
