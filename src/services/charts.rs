use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::services::dataset::{Cell, Dataset, DatasetError};
use crate::services::render::ChartRenderer;
use crate::services::storage::{StorageArea, StorageService};
use crate::utils::validation::file_stem;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Invalid chart type '{0}'")]
    UnknownType(String),

    #[error("Uploaded file '{0}' not found")]
    SourceNotFound(String),

    #[error("{0}")]
    Read(#[from] DatasetError),

    #[error("The uploaded file must have at least two columns")]
    TooFewColumns,

    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has a non-numeric value in row {row}")]
    NonNumeric { column: String, row: usize },

    #[error("{0}")]
    InvalidData(String),

    #[error("rendering failed: {0}")]
    Render(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Pie,
    Line,
}

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Bar, ChartKind::Pie, ChartKind::Line];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Pie => "pie",
            ChartKind::Line => "line",
        }
    }

    pub fn schema(&self) -> &'static ChartSchema {
        match self {
            ChartKind::Bar => &BAR_SCHEMA,
            ChartKind::Pie => &PIE_SCHEMA,
            ChartKind::Line => &LINE_SCHEMA,
        }
    }
}

impl FromStr for ChartKind {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ChartError::UnknownType(s.to_string()))
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How value columns are reduced before drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// The first value column, one value per row
    Single,
    /// Sum of all value columns per row
    RowSum,
    /// Every row becomes a series across the value columns
    Series,
}

/// Visual mark used to draw the data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Bars,
    Wedges,
    Lines,
}

/// Declarative recipe for one chart type
#[derive(Debug)]
pub struct ChartSchema {
    pub kind: ChartKind,
    pub title: &'static str,
    pub x_desc: &'static str,
    pub y_desc: &'static str,
    pub label_column: &'static str,
    pub value_columns: &'static [&'static str],
    pub aggregation: Aggregation,
    pub mark: Mark,
}

const QUARTERS: &[&str] = &["Sales_Q1", "Sales_Q2", "Sales_Q3", "Sales_Q4"];

pub static BAR_SCHEMA: ChartSchema = ChartSchema {
    kind: ChartKind::Bar,
    title: "Bar Chart - Q1 Sales",
    x_desc: "Category",
    y_desc: "Sales Q1",
    label_column: "Category",
    value_columns: &["Sales_Q1"],
    aggregation: Aggregation::Single,
    mark: Mark::Bars,
};

pub static PIE_SCHEMA: ChartSchema = ChartSchema {
    kind: ChartKind::Pie,
    title: "Pie Chart - Total Sales",
    x_desc: "",
    y_desc: "",
    label_column: "Category",
    value_columns: QUARTERS,
    aggregation: Aggregation::RowSum,
    mark: Mark::Wedges,
};

pub static LINE_SCHEMA: ChartSchema = ChartSchema {
    kind: ChartKind::Line,
    title: "Line Chart - Sales Trends",
    x_desc: "Quarter",
    y_desc: "Sales",
    label_column: "Category",
    value_columns: QUARTERS,
    aggregation: Aggregation::Series,
    mark: Mark::Lines,
};

/// Values extracted from a dataset according to a schema
#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    /// One value per category
    Categories { labels: Vec<String>, values: Vec<f64> },
    /// One named series per category across shared x positions
    Series {
        x_labels: Vec<String>,
        series: Vec<(String, Vec<f64>)>,
    },
}

impl ChartSchema {
    /// Pulls the columns this schema needs out of `dataset`
    pub fn extract(&self, dataset: &Dataset) -> Result<ChartData, ChartError> {
        let labels: Vec<String> = dataset
            .column(self.label_column)
            .ok_or_else(|| ChartError::MissingColumn(self.label_column.to_string()))?
            .into_iter()
            .map(Cell::display)
            .collect();

        let columns = self
            .value_columns
            .iter()
            .map(|name| numeric_column(dataset, name))
            .collect::<Result<Vec<_>, _>>()?;

        let data = match self.aggregation {
            Aggregation::Single => ChartData::Categories {
                labels,
                values: columns.into_iter().next().unwrap_or_default(),
            },
            Aggregation::RowSum => {
                let values = (0..labels.len())
                    .map(|row| columns.iter().map(|col| col[row]).sum())
                    .collect();
                ChartData::Categories { labels, values }
            }
            Aggregation::Series => ChartData::Series {
                x_labels: self.value_columns.iter().map(|c| c.to_string()).collect(),
                series: labels
                    .into_iter()
                    .enumerate()
                    .map(|(row, label)| (label, columns.iter().map(|col| col[row]).collect()))
                    .collect(),
            },
        };
        Ok(data)
    }
}

fn numeric_column(dataset: &Dataset, name: &str) -> Result<Vec<f64>, ChartError> {
    dataset
        .column(name)
        .ok_or_else(|| ChartError::MissingColumn(name.to_string()))?
        .into_iter()
        .enumerate()
        .map(|(row, cell)| {
            cell.as_number().ok_or_else(|| ChartError::NonNumeric {
                column: name.to_string(),
                row: row + 1,
            })
        })
        .collect()
}

/// `{type}_chart_{basename}.png`
pub fn chart_filename(kind: ChartKind, source_filename: &str) -> String {
    format!("{}_chart_{}.png", kind.as_str(), file_stem(source_filename))
}

pub struct GeneratedChart {
    pub kind: ChartKind,
    pub chart_filename: String,
    pub size: usize,
}

/// Loads an uploaded file, renders one chart from it and stores the PNG next to the upload
pub struct ChartService {
    storage: Arc<dyn StorageService>,
    renderer: ChartRenderer,
}

impl ChartService {
    pub fn new(storage: Arc<dyn StorageService>, renderer: ChartRenderer) -> Self {
        Self { storage, renderer }
    }

    pub async fn generate(
        &self,
        chart_type: &str,
        filename: &str,
    ) -> Result<GeneratedChart, ChartError> {
        if !self.storage.exists(StorageArea::Uploads, filename).await? {
            return Err(ChartError::SourceNotFound(filename.to_string()));
        }

        let bytes = self.storage.get(StorageArea::Uploads, filename).await?;
        let source = filename.to_string();
        let renderer = self.renderer.clone();
        let chart_type = chart_type.to_string();

        let handle = tokio::task::spawn_blocking(move || -> Result<(ChartKind, Vec<u8>), ChartError> {
            let dataset = Dataset::load(&source, &bytes)?;
            if dataset.column_count() < 2 {
                return Err(ChartError::TooFewColumns);
            }

            let kind: ChartKind = chart_type.parse()?;
            let schema = kind.schema();
            let data = schema.extract(&dataset)?;
            let png = renderer.render(schema, &data)?;
            Ok((kind, png))
        });

        let (kind, png) = handle
            .await
            .map_err(|e| ChartError::Render(format!("render task failed: {}", e)))??;

        let chart_filename = chart_filename(kind, filename);
        let size = png.len();
        self.storage
            .put(StorageArea::Uploads, &chart_filename, png)
            .await?;

        tracing::info!(
            "📊 Rendered {} chart {} ({} bytes) from {}",
            kind,
            chart_filename,
            size,
            filename
        );

        Ok(GeneratedChart {
            kind,
            chart_filename,
            size,
        })
    }
}
