use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::time::Duration;

/// Cloud cover reported for products whose metadata carries no usable value.
pub const UNKNOWN_CLOUD_COVER: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DateBounds {
    /// `ContentDate/Start gt start and ContentDate/Start lt end`
    #[default]
    Exclusive,
    /// `ContentDate/Start ge start and ContentDate/Start le end`
    Inclusive,
}

impl DateBounds {
    pub fn operators(self) -> (&'static str, &'static str) {
        match self {
            DateBounds::Exclusive => ("gt", "lt"),
            DateBounds::Inclusive => ("ge", "le"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub region: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub max_cloud: f64,
    pub date_bounds: DateBounds,
    pub name_contains: Option<String>,
    pub order_by_date: bool,
    pub expand_attributes: bool,
}

impl SearchQuery {
    pub fn new(region: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            region: region.to_string(),
            start,
            end,
            max_cloud: 30.0,
            date_bounds: DateBounds::default(),
            name_contains: None,
            order_by_date: false,
            expand_attributes: true,
        }
    }
}

/// One catalogue entry as returned by a search. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDescriptor {
    pub id: String,
    pub name: String,
    pub cloud_cover: f64,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadStatus {
    Success,
    Failed,
}

#[derive(Debug)]
pub struct DownloadReport {
    pub region: String,
    pub product: ProductDescriptor,
    pub output_path: Option<PathBuf>,
    pub status: DownloadStatus,
    pub bytes_downloaded: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub total_products: usize,
    pub downloaded: usize,
    pub search_failures: Vec<String>,
    pub reports: Vec<DownloadReport>,
}

impl RunSummary {
    /// Products found but not downloaded. Regions whose search failed contribute nothing here.
    pub fn failed(&self) -> usize {
        self.total_products - self.downloaded
    }
}
