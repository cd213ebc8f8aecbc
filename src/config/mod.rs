use std::env;
use std::path::{Path, PathBuf};

/// Runtime configuration for uploads, chart rendering and reports
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding uploaded spreadsheets and generated chart PNGs (default: "static/uploads")
    pub upload_dir: PathBuf,

    /// Directory holding generated PDF reports (default: "reports")
    pub report_dir: PathBuf,

    /// Public URL prefix under which chart images are served (default: "/static/uploads")
    pub chart_url_prefix: String,

    /// Public URL prefix for report downloads (default: "/download_report")
    pub report_url_prefix: String,

    /// Lowercase extensions accepted by the upload endpoint (default: csv, xlsx)
    pub allowed_extensions: Vec<String>,

    /// Maximum upload size in bytes (default: 16 MB)
    pub max_file_size: usize,

    /// Rendered chart width in pixels (default: 1000)
    pub chart_width: u32,

    /// Rendered chart height in pixels (default: 600)
    pub chart_height: u32,

    /// TrueType font used for chart text. When unset, common system locations are probed.
    pub font_path: Option<PathBuf>,

    /// Allowed CORS Origins (comma separated, "*" for any)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("static").join("uploads"),
            report_dir: PathBuf::from("reports"),
            chart_url_prefix: "/static/uploads".to_string(),
            report_url_prefix: "/download_report".to_string(),
            allowed_extensions: vec!["csv".to_string(), "xlsx".to_string()],
            max_file_size: 16 * 1024 * 1024, // 16 MB
            chart_width: 1000,
            chart_height: 600,
            font_path: None,
            allowed_origins: vec![
                "http://localhost:5000".to_string(),
                "http://127.0.0.1:5000".to_string(),
            ],
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            report_dir: env::var("REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.report_dir),

            chart_url_prefix: env::var("CHART_URL_PREFIX")
                .map(|v| normalize_prefix(&v))
                .unwrap_or(default.chart_url_prefix),

            report_url_prefix: env::var("REPORT_URL_PREFIX")
                .map(|v| normalize_prefix(&v))
                .unwrap_or(default.report_url_prefix),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|v| split_list(&v, true))
                .filter(|list| !list.is_empty())
                .unwrap_or(default.allowed_extensions),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            chart_width: env::var("CHART_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|w| *w > 0)
                .unwrap_or(default.chart_width),

            chart_height: env::var("CHART_HEIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|h| *h > 0)
                .unwrap_or(default.chart_height),

            font_path: env::var("CHART_FONT_PATH").ok().map(PathBuf::from),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| split_list(&v, false))
                .filter(|list| !list.is_empty())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config rooted under `root` (used by tests and local runs)
    pub fn development(root: &Path) -> Self {
        Self {
            upload_dir: root.join("static").join("uploads"),
            report_dir: root.join("reports"),
            chart_width: 640,
            chart_height: 400,
            allowed_origins: vec!["*".to_string()],
            ..Self::default()
        }
    }

    /// Public URL of a chart image stored in the uploads directory
    pub fn chart_url(&self, chart_filename: &str) -> String {
        format!("{}/{}", self.chart_url_prefix, chart_filename)
    }

    /// Public URL of a generated report
    pub fn report_url(&self, report_filename: &str) -> String {
        format!("{}/{}", self.report_url_prefix, report_filename)
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn split_list(raw: &str, lowercase: bool) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.'))
        .filter(|s| !s.is_empty())
        .map(|s| {
            if lowercase {
                s.to_lowercase()
            } else {
                s.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.upload_dir, PathBuf::from("static/uploads"));
        assert_eq!(config.report_dir, PathBuf::from("reports"));
        assert_eq!(config.allowed_extensions, vec!["csv", "xlsx"]);
        assert_eq!(config.max_file_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development(Path::new("/tmp/charts"));
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/charts/static/uploads"));
        assert_eq!(config.report_dir, PathBuf::from("/tmp/charts/reports"));
        assert_eq!(config.chart_url_prefix, "/static/uploads");
    }

    #[test]
    fn test_urls() {
        let config = AppConfig::default();
        assert_eq!(
            config.chart_url("bar_chart_sales.png"),
            "/static/uploads/bar_chart_sales.png"
        );
        assert_eq!(
            config.report_url("report_sales.pdf"),
            "/download_report/report_sales.pdf"
        );
    }

    #[test]
    fn test_list_and_prefix_parsing() {
        assert_eq!(split_list(" CSV, .xlsx ,,", true), vec!["csv", "xlsx"]);
        assert_eq!(normalize_prefix("static/charts/"), "/static/charts");
        assert_eq!(normalize_prefix("/files"), "/files");
    }
}
