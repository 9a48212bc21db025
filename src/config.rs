use crate::cli::Cli;
use crate::error::SentinelError;
use crate::regions::REGION_NAMES;
use crate::retry::RetryPolicy;
use crate::types::SearchQuery;
use chrono::NaiveDate;
use log::warn;
use std::path::PathBuf;
use std::time::Duration;

pub const IDENTITY_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
pub const CATALOGUE_URL: &str = "https://catalogue.dataspace.copernicus.eu/odata/v1";
pub const DOWNLOAD_URL: &str = "https://zipper.dataspace.copernicus.eu/odata/v1";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub identity_url: String,
    pub catalogue_url: String,
    pub download_url: String,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub endpoints: Endpoints,
    pub regions: Vec<String>,
    pub query: SearchQuery,
    pub output_dir: PathBuf,
    pub retry: RetryPolicy,
    pub download_delay: Duration,
}

impl RunConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, SentinelError> {
        let regions: Vec<String> = cli
            .regions
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if regions.is_empty() {
            return Err(SentinelError::InvalidInput("no regions given".to_string()));
        }
        for region in regions.iter().filter(|r| !REGION_NAMES.contains(&r.as_str())) {
            warn!("Region {} has no footprint and will yield no products", region);
        }

        if cli.start_date > cli.end_date {
            return Err(SentinelError::InvalidInput(format!(
                "start date {} is after end date {}",
                cli.start_date, cli.end_date
            )));
        }

        if !(0.0..=100.0).contains(&cli.max_cloud) {
            return Err(SentinelError::InvalidInput(format!(
                "max cloud cover {} is outside 0-100",
                cli.max_cloud
            )));
        }

        if cli.max_attempts == 0 {
            return Err(SentinelError::InvalidInput(
                "max attempts must be at least 1".to_string(),
            ));
        }

        let mut query = SearchQuery::new("", midnight(cli.start_date), midnight(cli.end_date));
        query.max_cloud = cli.max_cloud;
        query.date_bounds = cli.date_bounds;
        query.name_contains = cli.name_contains.clone();
        query.order_by_date = cli.order_by_date;
        query.expand_attributes = !cli.no_expand;

        Ok(Self {
            endpoints: Endpoints {
                identity_url: cli.identity_url.clone(),
                catalogue_url: cli.catalogue_url.clone(),
                download_url: cli.download_url.clone(),
            },
            regions,
            query,
            output_dir: cli.output_dir.clone(),
            retry: RetryPolicy::new(cli.max_attempts, Duration::from_secs(cli.retry_delay_secs)),
            download_delay: Duration::from_secs(cli.download_delay_secs),
        })
    }
}

fn midnight(date: NaiveDate) -> chrono::NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DateBounds;
    use clap::Parser;

    #[test]
    fn test_defaults_match_observed_run() {
        let cli = Cli::parse_from(["sentinel-downloader"]);
        let config = RunConfig::from_cli(&cli).unwrap();

        assert_eq!(config.regions, vec!["north", "central", "south"]);
        assert_eq!(config.output_dir, PathBuf::from("morocco_sentinel_data"));
        assert_eq!(config.query.max_cloud, 30.0);
        assert_eq!(config.query.date_bounds, DateBounds::Exclusive);
        assert!(config.query.expand_attributes);
        assert_eq!(config.query.start.to_string(), "2023-06-01 00:00:00");
        assert_eq!(config.query.end.to_string(), "2023-06-30 00:00:00");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_secs(30));
        assert_eq!(config.download_delay, Duration::from_secs(5));
        assert_eq!(config.endpoints.catalogue_url, CATALOGUE_URL);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "sentinel-downloader",
            "--regions",
            "south,north",
            "--date-bounds",
            "inclusive",
            "--name-contains",
            "MSIL2A",
            "--max-cloud",
            "12.5",
            "--no-expand",
        ]);
        let config = RunConfig::from_cli(&cli).unwrap();

        assert_eq!(config.regions, vec!["south", "north"]);
        assert_eq!(config.query.date_bounds, DateBounds::Inclusive);
        assert_eq!(config.query.name_contains.as_deref(), Some("MSIL2A"));
        assert_eq!(config.query.max_cloud, 12.5);
        assert!(!config.query.expand_attributes);
    }

    #[test]
    fn test_rejects_reversed_dates() {
        let cli = Cli::parse_from([
            "sentinel-downloader",
            "--start-date",
            "2023-07-01",
            "--end-date",
            "2023-06-01",
        ]);
        assert!(matches!(
            RunConfig::from_cli(&cli),
            Err(SentinelError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_cloud_cover_over_100() {
        let cli = Cli::parse_from(["sentinel-downloader", "--max-cloud", "101"]);
        assert!(RunConfig::from_cli(&cli).is_err());
    }
}
