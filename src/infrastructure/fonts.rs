use plotters::style::{FontStyle, register_font};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Locations probed when no font path is configured
const CANDIDATE_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

fn candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    match configured {
        Some(path) => vec![path.to_path_buf()],
        None => CANDIDATE_FONTS.iter().map(PathBuf::from).collect(),
    }
}

/// Registers the first readable TrueType font as plotters' "sans-serif".
/// Returns false when none could be loaded; charts are then drawn without text.
pub fn setup_chart_font(configured: Option<&Path>) -> bool {
    for path in candidates(configured) {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };

        // The registry keeps the font for the life of the process
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        match register_font("sans-serif", FontStyle::Normal, bytes) {
            Ok(()) => {
                info!("🔤 Chart font: {}", path.display());
                return true;
            }
            Err(_) => warn!("Font {} could not be parsed", path.display()),
        }
    }

    warn!("⚠️  No chart font found, charts will be rendered without text (set CHART_FONT_PATH)");
    false
}
