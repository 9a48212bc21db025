use crate::config::{CATALOGUE_URL, DOWNLOAD_URL, IDENTITY_URL};
use crate::types::DateBounds;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Download Sentinel-2 products for regions of Morocco", long_about = None)]
pub struct Cli {
    /// Regions to search (north, central, south)
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_values_t = [String::from("north"), String::from("central"), String::from("south")]
    )]
    pub regions: Vec<String>,

    /// First acquisition date (YYYY-MM-DD)
    #[arg(long, default_value = "2023-06-01")]
    pub start_date: NaiveDate,

    /// Last acquisition date (YYYY-MM-DD)
    #[arg(long, default_value = "2023-06-30")]
    pub end_date: NaiveDate,

    /// Output directory; one subdirectory per region is created inside it
    #[arg(short, long, default_value = "morocco_sentinel_data")]
    pub output_dir: PathBuf,

    /// Maximum cloud cover percentage
    #[arg(short = 'c', long, default_value_t = 30.0)]
    pub max_cloud: f64,

    /// Whether the date range bounds are exclusive (gt/lt) or inclusive (ge/le)
    #[arg(long, value_enum, default_value_t = DateBounds::Exclusive)]
    pub date_bounds: DateBounds,

    /// Only keep products whose name contains this fragment
    #[arg(long)]
    pub name_contains: Option<String>,

    /// Ask the catalogue to order results by acquisition start
    #[arg(long)]
    pub order_by_date: bool,

    /// Do not expand product attributes in search results
    #[arg(long)]
    pub no_expand: bool,

    /// Copernicus Data Space username (prompted when absent)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Log file, appended to on every run
    #[arg(long, default_value = "sentinel_download.log")]
    pub log_file: PathBuf,

    /// Pause between two downloads, in seconds
    #[arg(long, default_value_t = 5)]
    pub download_delay_secs: u64,

    /// Base wait before retrying a failed request, in seconds
    #[arg(long, default_value_t = 30)]
    pub retry_delay_secs: u64,

    /// Attempts per search or download, including the first
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    #[arg(long, default_value = IDENTITY_URL, hide = true)]
    pub identity_url: String,

    #[arg(long, default_value = CATALOGUE_URL, hide = true)]
    pub catalogue_url: String,

    #[arg(long, default_value = DOWNLOAD_URL, hide = true)]
    pub download_url: String,
}
