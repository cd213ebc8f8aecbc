use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

use crate::services::storage::{StorageArea, StorageService};
use crate::utils::validation::{file_stem, is_safe_key, sanitize_filename};

pub const REPORT_TITLE: &str = "Data Visualization Report";

/// Points per millimetre
const K: f32 = 72.0 / 25.4;
const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 10.0;
const BOTTOM_MARGIN_MM: f32 = 20.0;
const CELL_WIDTH_MM: f32 = 200.0;
const CELL_HEIGHT_MM: f32 = 10.0;
const CELL_PADDING_MM: f32 = 1.0;
const IMAGE_WIDTH_MM: f32 = 180.0;

/// Helvetica-Bold advance widths for printable ASCII, in 1/1000 em
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // '0'..'?'
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 'P'..'_'
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // '`'..'o'
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 'p'..'~'
];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(String),

    #[error("report task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
}

/// A chart requested for the report, resolved against the uploads area
#[derive(Debug, Clone)]
pub enum ChartSource {
    Found { label: String, bytes: Vec<u8> },
    Missing { label: String },
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub bytes: Vec<u8>,
    pub embedded: usize,
    pub missing: usize,
    pub failed: usize,
}

pub struct GeneratedReport {
    pub report_filename: String,
    pub outcome: ReportOutcome,
}

#[derive(Default)]
struct Page {
    operations: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
}

/// A4 portrait layout with a top-down cursor in millimetres
struct PdfWriter {
    doc: Document,
    pages: Vec<Page>,
    y: f32,
    image_count: usize,
}

impl PdfWriter {
    fn new() -> Self {
        let mut writer = Self {
            doc: Document::with_version("1.5"),
            pages: Vec::new(),
            y: MARGIN_MM,
            image_count: 0,
        };
        writer.add_page();
        writer
    }

    fn add_page(&mut self) {
        self.pages.push(Page::default());
        self.y = MARGIN_MM;
    }

    fn page(&mut self) -> &mut Page {
        if self.pages.is_empty() {
            self.pages.push(Page::default());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn ensure_room(&mut self, height_mm: f32) {
        if self.y + height_mm > PAGE_HEIGHT_MM - BOTTOM_MARGIN_MM {
            self.add_page();
        }
    }

    fn ln(&mut self, height_mm: f32) {
        self.y += height_mm;
    }

    /// One line of text in a full-width cell, then moves to the next line
    fn text_line(&mut self, text: &str, font: Font, size: f32, align: Align) {
        self.ensure_room(CELL_HEIGHT_MM);

        let encoded = win_ansi(text);
        let x_mm = match align {
            Align::Left => MARGIN_MM + CELL_PADDING_MM,
            Align::Center => {
                MARGIN_MM + (CELL_WIDTH_MM - text_width_mm(&encoded, font, size)) / 2.0
            }
        };
        let baseline_mm = self.y + CELL_HEIGHT_MM / 2.0 + 0.3 * size / K;

        self.page().operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource_name().into(), size.into()]),
            Operation::new(
                "Td",
                vec![(x_mm * K).into(), ((PAGE_HEIGHT_MM - baseline_mm) * K).into()],
            ),
            Operation::new("Tj", vec![Object::String(encoded, StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);

        self.y += CELL_HEIGHT_MM;
    }

    /// Places an image at the left margin, `IMAGE_WIDTH_MM` wide
    fn image(&mut self, bytes: &[u8]) -> Result<(), ReportError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ReportError::Image(e.to_string()))?
            .to_rgb8();
        let (width_px, height_px) = decoded.dimensions();
        if width_px == 0 || height_px == 0 {
            return Err(ReportError::Image("image has no pixels".to_string()));
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(decoded.as_raw())?;
        let compressed = encoder.finish()?;

        let xobject = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width_px as i64,
                "Height" => height_px as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            compressed,
        );
        let image_id = self.doc.add_object(xobject);

        let height_mm = IMAGE_WIDTH_MM * height_px as f32 / width_px as f32;
        self.ensure_room(height_mm);

        self.image_count += 1;
        let name = format!("Im{}", self.image_count);
        let bottom_pt = (PAGE_HEIGHT_MM - self.y - height_mm) * K;

        let page = self.page();
        page.images.push((name.clone(), image_id));
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    (IMAGE_WIDTH_MM * K).into(),
                    0.into(),
                    0.into(),
                    (height_mm * K).into(),
                    (MARGIN_MM * K).into(),
                    bottom_pt.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);

        self.y += height_mm;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, ReportError> {
        let regular_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });

        let pages_id = self.doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());

        for page in std::mem::take(&mut self.pages) {
            let content = Content {
                operations: page.operations,
            };
            let content_id = self
                .doc
                .add_object(Stream::new(dictionary! {}, content.encode()?));

            let mut xobjects = lopdf::Dictionary::new();
            for (name, id) in page.images {
                xobjects.set(name, id);
            }

            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! {
                        Font::Regular.resource_name() => regular_id,
                        Font::Bold.resource_name() => bold_id,
                    },
                    "XObject" => xobjects,
                },
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let media_box: Vec<Object> = vec![
            0.into(),
            0.into(),
            (PAGE_WIDTH_MM * K).into(),
            (PAGE_HEIGHT_MM * K).into(),
        ];
        self.doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => media_box,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

/// Latin-1 subset of WinAnsi; anything else becomes `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn text_width_mm(encoded: &[u8], font: Font, size: f32) -> f32 {
    let units: u32 = encoded
        .iter()
        .map(|b| match (font, b) {
            (Font::Bold, 32..=126) => u32::from(HELVETICA_BOLD_WIDTHS[(b - 32) as usize]),
            _ => 556,
        })
        .sum();
    units as f32 * size / 1000.0 / K
}

/// Lays out the report: title, source line, then each chart in order.
/// Missing or undecodable charts become a text line instead of failing the report.
pub fn assemble_report(
    source_filename: &str,
    charts: &[ChartSource],
) -> Result<ReportOutcome, ReportError> {
    let mut pdf = PdfWriter::new();
    pdf.text_line(REPORT_TITLE, Font::Bold, 16.0, Align::Center);
    pdf.ln(10.0);
    pdf.text_line(
        &format!("Source File: {}", source_filename),
        Font::Regular,
        12.0,
        Align::Left,
    );

    let (mut embedded, mut missing, mut failed) = (0, 0, 0);
    for chart in charts {
        match chart {
            ChartSource::Found { label, bytes } => {
                pdf.ln(10.0);
                match pdf.image(bytes) {
                    Ok(()) => embedded += 1,
                    Err(e) => {
                        tracing::warn!("Could not embed chart {}: {}", label, e);
                        pdf.text_line(
                            &format!("Error adding image: {}", label),
                            Font::Regular,
                            12.0,
                            Align::Left,
                        );
                        failed += 1;
                    }
                }
            }
            ChartSource::Missing { label } => {
                pdf.text_line(
                    &format!("Chart not found: {}", label),
                    Font::Regular,
                    12.0,
                    Align::Left,
                );
                missing += 1;
            }
        }
    }

    Ok(ReportOutcome {
        bytes: pdf.finish()?,
        embedded,
        missing,
        failed,
    })
}

/// `report_{basename}.pdf`, sanitized into a storage key
pub fn report_filename(source_filename: &str) -> anyhow::Result<String> {
    sanitize_filename(&format!("report_{}.pdf", file_stem(source_filename)))
}

pub struct ReportService {
    storage: Arc<dyn StorageService>,
    chart_url_prefix: String,
}

impl ReportService {
    pub fn new(storage: Arc<dyn StorageService>, chart_url_prefix: String) -> Self {
        Self {
            storage,
            chart_url_prefix,
        }
    }

    /// Storage key and display label for a chart URL
    fn chart_key(&self, chart_url: &str) -> (String, String) {
        let path = chart_url
            .strip_prefix(self.chart_url_prefix.as_str())
            .unwrap_or(chart_url);
        let name = path.trim_matches('/').rsplit('/').next().unwrap_or_default();
        (name.to_string(), format!("uploads/{}", name))
    }

    async fn resolve(&self, chart_url: &str) -> Result<ChartSource, ReportError> {
        let (key, label) = self.chart_key(chart_url);
        if !is_safe_key(&key) || !self.storage.exists(StorageArea::Uploads, &key).await? {
            return Ok(ChartSource::Missing { label });
        }
        let bytes = self.storage.get(StorageArea::Uploads, &key).await?;
        Ok(ChartSource::Found { label, bytes })
    }

    /// Builds the PDF in memory without storing it
    pub async fn build(
        &self,
        source_filename: &str,
        chart_urls: &[String],
    ) -> Result<ReportOutcome, ReportError> {
        let mut charts = Vec::with_capacity(chart_urls.len());
        for url in chart_urls {
            charts.push(self.resolve(url).await?);
        }

        let source = source_filename.to_string();
        tokio::task::spawn_blocking(move || assemble_report(&source, &charts))
            .await
            .map_err(|e| ReportError::Task(e.to_string()))?
    }

    /// Builds the PDF and saves it to the reports area
    pub async fn generate(
        &self,
        source_filename: &str,
        chart_urls: &[String],
    ) -> Result<GeneratedReport, ReportError> {
        let report_filename = report_filename(source_filename)?;
        let outcome = self.build(source_filename, chart_urls).await?;

        self.storage
            .put(StorageArea::Reports, &report_filename, outcome.bytes.clone())
            .await?;

        tracing::info!(
            "📄 Report {} written ({} bytes, {} embedded, {} missing, {} failed)",
            report_filename,
            outcome.bytes.len(),
            outcome.embedded,
            outcome.missing,
            outcome.failed
        );

        Ok(GeneratedReport {
            report_filename,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::LocalStorageService;
    use image::{ImageBuffer, ImageOutputFormat, Rgb};

    /// 10x6 PNG, the same aspect ratio as a default chart
    fn small_png() -> Vec<u8> {
        let img = ImageBuffer::from_pixel(10, 6, Rgb([135u8, 206, 235]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|w| w == needle.as_bytes())
    }

    fn found(name: &str, bytes: Vec<u8>) -> ChartSource {
        ChartSource::Found {
            label: format!("uploads/{}", name),
            bytes,
        }
    }

    #[test]
    fn test_report_with_one_chart() {
        let outcome = assemble_report("sales.csv", &[found("bar_chart_sales.png", small_png())]).unwrap();
        assert!(outcome.bytes.starts_with(b"%PDF-1.5"));
        assert_eq!((outcome.embedded, outcome.missing, outcome.failed), (1, 0, 0));

        let doc = Document::load_mem(&outcome.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(contains(&outcome.bytes, "Data Visualization Report"));
        assert!(contains(&outcome.bytes, "Source File: sales.csv"));
    }

    #[test]
    fn test_missing_and_broken_charts_do_not_abort() {
        let charts = [
            ChartSource::Missing {
                label: "uploads/gone.png".into(),
            },
            found("broken.png", b"not an image".to_vec()),
            found("ok.png", small_png()),
        ];
        let outcome = assemble_report("sales.csv", &charts).unwrap();
        assert_eq!((outcome.embedded, outcome.missing, outcome.failed), (1, 1, 1));
        assert!(contains(&outcome.bytes, "Chart not found: uploads/gone.png"));
        assert!(contains(&outcome.bytes, "Error adding image: uploads/broken.png"));
    }

    #[test]
    fn test_third_chart_moves_to_second_page() {
        let charts: Vec<_> = (0..3).map(|i| found(&format!("c{}.png", i), small_png())).collect();
        let outcome = assemble_report("sales.csv", &charts).unwrap();
        let doc = Document::load_mem(&outcome.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_report_filename() {
        assert_eq!(report_filename("sales.csv").unwrap(), "report_sales.pdf");
        assert_eq!(report_filename("q1 data.xlsx").unwrap(), "report_q1_data.pdf");
    }

    #[test]
    fn test_title_is_centered() {
        let width = text_width_mm(&win_ansi(REPORT_TITLE), Font::Bold, 16.0);
        assert!(width > 60.0 && width < 80.0);
        assert_eq!(win_ansi("Café €"), b"Caf\xe9 ?".to_vec());
    }

    #[tokio::test]
    async fn test_generate_resolves_chart_urls() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorageService::new(
            dir.path().join("uploads"),
            dir.path().join("reports"),
        ));
        storage.ensure_dirs().await.unwrap();
        storage
            .put(StorageArea::Uploads, "bar_chart_sales.png", small_png())
            .await
            .unwrap();

        let service = ReportService::new(storage.clone(), "/static/uploads".to_string());
        let report = service
            .generate(
                "sales.csv",
                &[
                    "/static/uploads/bar_chart_sales.png".to_string(),
                    "/static/uploads/pie_chart_sales.png".to_string(),
                    "/static/uploads/../../secret".to_string(),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.report_filename, "report_sales.pdf");
        assert_eq!(report.outcome.embedded, 1);
        assert_eq!(report.outcome.missing, 2);
        assert!(
            storage
                .exists(StorageArea::Reports, "report_sales.pdf")
                .await
                .unwrap()
        );
    }
}
