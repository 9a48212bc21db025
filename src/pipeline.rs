use crate::auth::{Authenticate, Session};
use crate::catalogue::{sort_by_cloud_cover, CatalogueClient};
use crate::config::Endpoints;
use crate::downloader::{output_path, DownloadClient};
use crate::error::SentinelError;
use crate::retry::RetryPolicy;
use crate::types::{DownloadReport, DownloadStatus, RunSummary, SearchQuery};
use colored::*;
use log::{error, info};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;

pub const STATS_FILE: &str = "download_stats.csv";

pub struct Orchestrator {
    catalogue: CatalogueClient,
    downloads: DownloadClient,
    download_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        client: reqwest::Client,
        endpoints: &Endpoints,
        retry: RetryPolicy,
        download_delay: Duration,
    ) -> Self {
        Self {
            catalogue: CatalogueClient::new(client.clone(), &endpoints.catalogue_url, retry),
            downloads: DownloadClient::new(client, &endpoints.download_url, retry),
            download_delay,
        }
    }

    /// Searches every region in turn and downloads its products, clearest first, into
    /// `<output_base_dir>/<region>/`. Only directory creation errors abort the run.
    pub async fn download_sentinel_images<A: Authenticate>(
        &self,
        session: &mut Session<A>,
        regions: &[String],
        base_query: &SearchQuery,
        output_base_dir: &Path,
    ) -> Result<RunSummary, SentinelError> {
        tokio::fs::create_dir_all(output_base_dir).await?;
        let mut summary = RunSummary::default();

        for region in regions {
            info!("Processing region: {}", region);
            println!("\n{} {}", "Processing region:".bold(), region);

            let region_dir = output_base_dir.join(region);
            tokio::fs::create_dir_all(&region_dir).await?;

            let query = SearchQuery {
                region: region.clone(),
                ..base_query.clone()
            };
            let mut products = match self.catalogue.try_search(session, &query).await {
                Ok(products) => products,
                Err(_) => {
                    summary.search_failures.push(region.clone());
                    Vec::new()
                }
            };

            if products.is_empty() {
                println!("No products found for {}", region);
                continue;
            }

            summary.total_products += products.len();
            println!("Found {} products for {}", products.len(), region);
            sort_by_cloud_cover(&mut products);

            for product in products {
                println!("\nDownloading: {}", product.name);
                println!("Cloud coverage: {:.1}%", product.cloud_cover);
                println!("Product ID: {}", product.id);

                let start_time = Instant::now();
                let result = self
                    .downloads
                    .try_download(session, &product, &region_dir)
                    .await;

                let (status, bytes_downloaded, error) = match result {
                    Ok(bytes) => {
                        summary.downloaded += 1;
                        println!("Successfully downloaded: {}", product.name.green());
                        (DownloadStatus::Success, bytes, None)
                    }
                    Err(e) => (DownloadStatus::Failed, 0, Some(e.to_string())),
                };

                summary.reports.push(DownloadReport {
                    region: region.clone(),
                    output_path: output_path(&region_dir, &product).ok(),
                    product,
                    status,
                    bytes_downloaded,
                    duration: start_time.elapsed(),
                    error,
                });

                sleep(self.download_delay).await;
            }
        }

        if let Err(e) = write_stats_csv(&summary, output_base_dir) {
            error!("Failed to write stats CSV: {}", e);
        }
        print_summary(&summary);

        Ok(summary)
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!("\n{}", "Download Summary:".bold());
    println!("Total products found: {}", summary.total_products);
    println!(
        "Successfully downloaded: {}",
        summary.downloaded.to_string().green()
    );
    println!("Failed downloads: {}", summary.failed().to_string().red());

    if !summary.search_failures.is_empty() {
        println!(
            "Regions where the search failed: {}",
            summary.search_failures.join(", ").yellow()
        );
    }

    for report in summary
        .reports
        .iter()
        .filter(|r| r.status == DownloadStatus::Failed)
    {
        println!(
            "✗ {} - Error: {}",
            report.product.name.red(),
            report.error.as_deref().unwrap_or("unknown")
        );
        if let Some(path) = &report.output_path {
            println!("  Output: {}", path.display());
        }
    }
}

fn write_stats_csv(summary: &RunSummary, output_dir: &Path) -> Result<(), SentinelError> {
    let stats_path = output_dir.join(STATS_FILE);
    let mut wtr = csv::WriterBuilder::new().from_path(stats_path)?;

    wtr.write_record([
        "Region",
        "Product",
        "Id",
        "Cloud cover (%)",
        "Status",
        "Size (MB)",
        "Duration (s)",
        "Error",
    ])?;

    for report in &summary.reports {
        wtr.write_record(&[
            report.region.clone(),
            report.product.name.clone(),
            report.product.id.clone(),
            format!("{:.1}", report.product.cloud_cover),
            format!("{:?}", report.status),
            format!("{:.2}", report.bytes_downloaded as f64 / 1_048_576.0),
            format!("{:.2}", report.duration.as_secs_f64()),
            report.error.clone().unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
