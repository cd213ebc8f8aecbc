//! Chart rendering with the plotters bitmap backend.
//!
//! Every call owns its pixel buffer and drawing area through a [`RenderContext`],
//! so concurrent renders never share figure state. Text is only drawn when a
//! font was registered at startup.

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::coord::Shift;
use plotters::coord::ranged1d::SegmentValue;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::services::charts::{ChartData, ChartError, ChartSchema, Mark};
use crate::services::dataset::format_number;

const SKY_BLUE: RGBColor = RGBColor(135, 206, 235);
const FONT: &str = "sans-serif";

/// Category colors for slices and series
pub const TAB10: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

const PIE_START_DEGREES: f64 = 140.0;

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for ChartError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        ChartError::Render(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ChartRenderer {
    width: u32,
    height: u32,
    text: bool,
}

/// Drawing state for a single render call
pub struct RenderContext<'a> {
    area: DrawingArea<BitMapBackend<'a>, Shift>,
    text: bool,
}

impl ChartRenderer {
    pub fn new(width: u32, height: u32, text: bool) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            text,
        }
    }

    /// Renders `data` following `schema` and returns PNG bytes
    pub fn render(&self, schema: &ChartSchema, data: &ChartData) -> Result<Vec<u8>, ChartError> {
        let mut pixels = vec![0u8; self.width as usize * self.height as usize * 3];
        {
            let ctx = RenderContext {
                area: BitMapBackend::with_buffer(&mut pixels, (self.width, self.height))
                    .into_drawing_area(),
                text: self.text,
            };
            ctx.area.fill(&WHITE)?;

            match (schema.mark, data) {
                (Mark::Bars, ChartData::Categories { labels, values }) => {
                    draw_bars(&ctx, schema, labels, values)?
                }
                (Mark::Wedges, ChartData::Categories { labels, values }) => {
                    draw_pie(&ctx, schema, labels, values)?
                }
                (Mark::Lines, ChartData::Series { x_labels, series }) => {
                    draw_lines(&ctx, schema, x_labels, series)?
                }
                (mark, _) => {
                    return Err(ChartError::InvalidData(format!(
                        "{:?} marks cannot draw this data shape",
                        mark
                    )));
                }
            }

            ctx.area.present()?;
        }
        encode_png(&pixels, self.width, self.height)
    }
}

fn encode_png(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ChartError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(pixels, width, height, ColorType::Rgb8)
        .map_err(|e| ChartError::Render(format!("PNG encoding failed: {}", e)))?;
    Ok(out)
}

fn segment_label(value: &SegmentValue<usize>, labels: &[String]) -> String {
    match value {
        SegmentValue::CenterOf(i) => labels.get(*i).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Integer ranges are inclusive, so `n` categories need `0..n - 1`.
/// A single category still gets two slots to keep its segment non-degenerate.
fn category_axis(count: usize) -> std::ops::Range<usize> {
    0..count.max(2) - 1
}

/// Value axis range padded by 10% and always including zero
fn value_range<'v>(values: impl Iterator<Item = &'v f64>) -> (f64, f64) {
    let (min, max) = values.fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = (max - min).max(1.0);
    let lower = if min < 0.0 { min - span * 0.1 } else { 0.0 };
    (lower, max + span * 0.1)
}

fn annotation_style(size: u32) -> TextStyle<'static> {
    TextStyle::from((FONT, size)).pos(Pos::new(HPos::Center, VPos::Bottom))
}

fn draw_bars(
    ctx: &RenderContext<'_>,
    schema: &ChartSchema,
    labels: &[String],
    values: &[f64],
) -> Result<(), ChartError> {
    if labels.is_empty() {
        return Err(ChartError::InvalidData("no data rows to plot".to_string()));
    }

    let (y_min, y_max) = value_range(values.iter());
    let max = values.iter().cloned().fold(f64::MIN, f64::max);
    let offset = max * 0.01;

    let mut builder = ChartBuilder::on(&ctx.area);
    builder.margin(20);
    if ctx.text {
        builder
            .caption(schema.title, (FONT, 28))
            .x_label_area_size(50)
            .y_label_area_size(70);
    }
    let mut chart = builder.build_cartesian_2d(category_axis(labels.len()).into_segmented(), y_min..y_max)?;

    if ctx.text {
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(labels.len())
            .x_label_formatter(&|v| segment_label(v, labels))
            .y_label_formatter(&|y| format_number(*y))
            .x_desc(schema.x_desc)
            .y_desc(schema.y_desc)
            .label_style((FONT, 14))
            .draw()?;
    }

    chart.draw_series(values.iter().enumerate().map(|(i, v)| {
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
            SKY_BLUE.filled(),
        );
        bar.set_margin(0, 0, 10, 10);
        bar
    }))?;

    if ctx.text {
        chart.draw_series(values.iter().enumerate().map(|(i, v)| {
            Text::new(
                format_number(*v),
                (SegmentValue::CenterOf(i), *v + offset),
                annotation_style(14),
            )
        }))?;
    }

    Ok(())
}

/// Point on a circle in pixel space; angles are counter-clockwise from 3 o'clock
fn polar(center: (i32, i32), radius: f64, degrees: f64) -> (i32, i32) {
    let rad = degrees.to_radians();
    (
        center.0 + (radius * rad.cos()).round() as i32,
        center.1 - (radius * rad.sin()).round() as i32,
    )
}

fn draw_pie(
    ctx: &RenderContext<'_>,
    schema: &ChartSchema,
    labels: &[String],
    values: &[f64],
) -> Result<(), ChartError> {
    if labels.is_empty() {
        return Err(ChartError::InvalidData("no data rows to plot".to_string()));
    }
    if values.iter().any(|v| *v < 0.0) {
        return Err(ChartError::InvalidData(
            "pie chart values must not be negative".to_string(),
        ));
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Err(ChartError::InvalidData(
            "pie chart values sum to zero".to_string(),
        ));
    }

    let area = if ctx.text {
        ctx.area.titled(schema.title, (FONT, 28))?
    } else {
        ctx.area.clone()
    };
    let (w, h) = area.dim_in_pixel();
    let center = (w as i32 / 2, h as i32 / 2);
    let radius = f64::from(w.min(h)) * 0.38;

    let mut start = PIE_START_DEGREES;
    let mut wedges = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let sweep = 360.0 * value / total;
        let steps = (sweep.ceil() as usize).max(1);
        let mut points = Vec::with_capacity(steps + 2);
        points.push(center);
        for step in 0..=steps {
            points.push(polar(center, radius, start + sweep * step as f64 / steps as f64));
        }
        area.draw(&Polygon::new(points, TAB10[i % TAB10.len()].filled()))?;
        wedges.push((start + sweep / 2.0, value / total * 100.0));
        start += sweep;
    }

    if ctx.text {
        let centered = TextStyle::from((FONT, 16)).pos(Pos::new(HPos::Center, VPos::Center));
        for (i, (mid, percent)) in wedges.into_iter().enumerate() {
            area.draw(&Text::new(
                format!("{:.1}%", percent),
                polar(center, radius * 0.6, mid),
                centered.clone(),
            ))?;

            let side = if mid.to_radians().cos() >= 0.0 {
                HPos::Left
            } else {
                HPos::Right
            };
            area.draw(&Text::new(
                labels[i].clone(),
                polar(center, radius * 1.1, mid),
                TextStyle::from((FONT, 16)).pos(Pos::new(side, VPos::Center)),
            ))?;
        }
    }

    Ok(())
}

fn draw_lines(
    ctx: &RenderContext<'_>,
    schema: &ChartSchema,
    x_labels: &[String],
    series: &[(String, Vec<f64>)],
) -> Result<(), ChartError> {
    if series.is_empty() || x_labels.is_empty() {
        return Err(ChartError::InvalidData("no data rows to plot".to_string()));
    }

    let (y_min, y_max) = value_range(series.iter().flat_map(|(_, values)| values.iter()));
    let max = series
        .iter()
        .flat_map(|(_, values)| values.iter().cloned())
        .fold(f64::MIN, f64::max);
    let offset = max * 0.01;

    let mut builder = ChartBuilder::on(&ctx.area);
    builder.margin(20);
    if ctx.text {
        builder
            .caption(schema.title, (FONT, 28))
            .x_label_area_size(50)
            .y_label_area_size(70);
    }
    let mut chart =
        builder.build_cartesian_2d(category_axis(x_labels.len()).into_segmented(), y_min..y_max)?;

    if ctx.text {
        chart
            .configure_mesh()
            .x_labels(x_labels.len())
            .x_label_formatter(&|v| segment_label(v, x_labels))
            .y_label_formatter(&|y| format_number(*y))
            .x_desc(schema.x_desc)
            .y_desc(schema.y_desc)
            .label_style((FONT, 14))
            .draw()?;
    }

    for (i, (name, values)) in series.iter().enumerate() {
        let color = TAB10[i % TAB10.len()];
        let points: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(x, y)| (SegmentValue::CenterOf(x), *y))
            .collect();

        let line = chart.draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))?;
        if ctx.text {
            line.label(name.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        chart.draw_series(
            points
                .iter()
                .map(|point| Circle::new(point.clone(), 4, color.filled())),
        )?;

        if ctx.text {
            chart.draw_series(values.iter().enumerate().map(|(x, y)| {
                Text::new(
                    format_number(*y),
                    (SegmentValue::CenterOf(x), *y + offset),
                    annotation_style(12),
                )
            }))?;
        }
    }

    if ctx.text {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font((FONT, 14))
            .draw()?;
    }

    Ok(())
}
