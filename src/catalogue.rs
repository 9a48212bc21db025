use crate::auth::{AccessToken, Authenticate, Session};
use crate::error::SentinelError;
use crate::regions::{self, Polygon};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{ProductDescriptor, SearchQuery, UNKNOWN_CLOUD_COVER};
use log::{debug, error, info, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashSet;

pub const COLLECTION: &str = "SENTINEL-2";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub struct CatalogueClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CatalogueClient {
    pub fn new(client: reqwest::Client, base_url: &str, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        }
    }

    /// Searches the catalogue, swallowing every failure into an empty result.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn search<A: Authenticate>(
        &self,
        session: &mut Session<A>,
        query: &SearchQuery,
    ) -> Vec<ProductDescriptor> {
        self.try_search(session, query).await.unwrap_or_default()
    }

    /// Like [`CatalogueClient::search`] but hands back the final error once retries are exhausted.
    /// Unknown regions fail immediately, without touching the network.
    pub async fn try_search<A: Authenticate>(
        &self,
        session: &mut Session<A>,
        query: &SearchQuery,
    ) -> Result<Vec<ProductDescriptor>, SentinelError> {
        let footprint = match regions::polygon(&query.region) {
            Some(footprint) => footprint,
            None => {
                error!("Invalid region: {}", query.region);
                return Err(SentinelError::UnknownRegion(query.region.clone()));
            }
        };

        info!(
            "Searching for scenes in {} from {} to {}",
            query.region, query.start, query.end
        );
        let params = query_params(query, &footprint);
        let params = &params;

        with_retry(&self.retry, session, "Search", move |token| {
            self.fetch(params, token)
        })
        .await
    }

    async fn fetch(
        &self,
        params: &[(&'static str, String)],
        token: AccessToken,
    ) -> Result<Vec<ProductDescriptor>, SentinelError> {
        let resp = self
            .client
            .get(format!("{}/Products", self.base_url))
            .query(params)
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SentinelError::Search(format!("{} {}", status, body)));
        }

        let body: Value = resp.json().await?;
        let products = parse_products(&body)?;

        if products.is_empty() {
            warn!("Search returned no products");
        } else {
            debug!(
                "Sample product structure: {}",
                serde_json::to_string_pretty(&products[0].attributes)?
            );
            info!("Found {} products", products.len());
        }
        Ok(products)
    }
}

fn query_params(query: &SearchQuery, footprint: &Polygon) -> Vec<(&'static str, String)> {
    let mut params = vec![("$filter", build_filter(query, footprint))];
    if query.order_by_date {
        params.push(("$orderby", "ContentDate/Start asc".to_string()));
    }
    if query.expand_attributes {
        params.push(("$expand", "Attributes".to_string()));
    }
    params
}

/// OData filter combining collection, optional name substring, footprint intersection, content
/// date bounds and the cloud cover threshold.
pub fn build_filter(query: &SearchQuery, footprint: &Polygon) -> String {
    let (lower, upper) = query.date_bounds.operators();
    let mut clauses = vec![format!("Collection/Name eq '{}'", COLLECTION)];

    if let Some(fragment) = &query.name_contains {
        clauses.push(format!("contains(Name,'{}')", fragment.replace('\'', "''")));
    }

    clauses.push(format!(
        "OData.CSC.Intersects(area=geography'SRID=4326;{}')",
        footprint.to_wkt()
    ));
    clauses.push(format!(
        "ContentDate/Start {} {}",
        lower,
        query.start.format(DATE_FORMAT)
    ));
    clauses.push(format!(
        "ContentDate/Start {} {}",
        upper,
        query.end.format(DATE_FORMAT)
    ));
    clauses.push(format!(
        "Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' and att/Value lt {})",
        query.max_cloud
    ));

    clauses.join(" and ")
}

/// Reads the `value` array of a catalogue response. Records without a string `Id` and `Name` are
/// dropped, as are repeats of an `Id` already seen.
pub fn parse_products(body: &Value) -> Result<Vec<ProductDescriptor>, SentinelError> {
    let records = match body.get("value") {
        None => return Ok(Vec::new()),
        Some(Value::Array(records)) => records,
        Some(_) => {
            return Err(SentinelError::Search(
                "response field 'value' is not an array".to_string(),
            ))
        }
    };

    let mut seen = HashSet::new();
    let mut products = Vec::with_capacity(records.len());

    for record in records {
        let id = record.get("Id").and_then(Value::as_str);
        let name = record.get("Name").and_then(Value::as_str);
        let (id, name) = match (id, name) {
            (Some(id), Some(name)) => (id, name),
            _ => {
                warn!("Skipping catalogue record without Id/Name: {}", record);
                continue;
            }
        };

        if !seen.insert(id.to_string()) {
            warn!("Skipping duplicate product {}", id);
            continue;
        }

        products.push(ProductDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            cloud_cover: get_cloud_cover(record),
            attributes: record.clone(),
        });
    }

    Ok(products)
}

type CloudCoverLocator = fn(&Value) -> Option<&Value>;

static MISSING: Value = Value::Null;

/// Places a catalogue record may carry its cloud cover, in the order they are consulted.
const CLOUD_COVER_LOCATORS: [CloudCoverLocator; 3] =
    [top_level_cloud_cover, properties_cloud_cover, attribute_cloud_cover];

fn top_level_cloud_cover(record: &Value) -> Option<&Value> {
    record.get("CloudCover")
}

fn properties_cloud_cover(record: &Value) -> Option<&Value> {
    record.get("Properties")?.get("cloudCover")
}

fn attribute_cloud_cover(record: &Value) -> Option<&Value> {
    record
        .get("Attributes")?
        .as_array()?
        .iter()
        .find(|attr| attr.get("Name").and_then(Value::as_str) == Some("cloudCover"))
        .map(|attr| attr.get("Value").unwrap_or(&MISSING))
}

/// Cloud cover percentage of a raw catalogue record. The first location that is present decides;
/// a missing, non-numeric or out of range value yields 100.
pub fn get_cloud_cover(record: &Value) -> f64 {
    CLOUD_COVER_LOCATORS
        .iter()
        .find_map(|locate| locate(record))
        .and_then(as_percentage)
        .unwrap_or(UNKNOWN_CLOUD_COVER)
}

fn as_percentage(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (number.is_finite() && (0.0..=100.0).contains(&number)).then_some(number)
}

/// Clearest scenes first. The sort is stable so equal cloud covers keep catalogue order.
pub fn sort_by_cloud_cover(products: &mut [ProductDescriptor]) {
    products.sort_by(|a, b| a.cloud_cover.total_cmp(&b.cloud_cover));
}
