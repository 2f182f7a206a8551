//! Fetch command implementation

use clap::Args;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::time::Duration;
use tracing::info;

use super::{Cli, CliError};
use crate::cancel::SharedCancel;
use crate::fetcher::{Fetcher, Query};
use crate::storage::RecordStore;
use crate::{Endpoint, RawItem};

/// Parse a `key=value` query parameter
fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("'{s}' is not in key=value form"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("'{s}' has an empty key"));
    }
    if key == "offset" || key == "limit" {
        return Err(format!("'{key}' is managed by the pager; use --page-size"));
    }

    Ok((key.to_string(), value.to_string()))
}

/// Fetch command arguments
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Endpoint: properties, listings-sale, listings-rental, avm-value, avm-rent, markets
    pub endpoint: Endpoint,

    /// Query parameter as key=value (repeatable), e.g. --param city=Austin
    #[arg(long = "param", short = 'p', value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Fetch a single record by id
    #[arg(long)]
    pub id: Option<String>,

    /// Maximum pages to fetch
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: Option<u32>,

    /// Items per page (1 to the configured maximum)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Print one JSON line per page as pages arrive
    #[arg(long, conflicts_with = "store")]
    pub stream: bool,

    /// Store fetched records locally instead of printing them
    #[arg(long)]
    pub store: bool,
}

impl FetchArgs {
    fn query(&self) -> Query {
        let mut query = Query::new(self.endpoint);
        for (key, value) in &self.params {
            query = query.param(key.clone(), value.clone());
        }
        if let Some(id) = &self.id {
            query = query.with_id(id.clone());
        }
        query
    }

    /// Execute the fetch command
    pub async fn execute(&self, cli: &Cli, cancel: SharedCancel) -> Result<(), CliError> {
        let mut config = cli.load_config()?;
        if let Some(page_size) = self.page_size {
            if page_size == 0 || page_size > config.max_page_size {
                return Err(CliError::InvalidArgument(format!(
                    "--page-size must be between 1 and {}, got {page_size}",
                    config.max_page_size
                )));
            }
            config.default_page_size = page_size;
        }

        let mut fetcher = Fetcher::from_config(&config)?.with_cancel(cancel);
        let query = self.query();

        info!(
            endpoint = %query.endpoint,
            path = %query.path(),
            max_pages = ?self.max_pages,
            "Starting fetch"
        );

        if self.store {
            let store = RecordStore::connect(&config.database_url).await?;
            fetcher = fetcher.with_store(store);
            return self.execute_ingest(&fetcher, &query).await;
        }

        if self.stream {
            return self.execute_stream(&fetcher, &query).await;
        }

        let items = self.collect_items(&fetcher, &query).await?;
        println!("{}", serde_json::to_string_pretty(&items)?);
        Ok(())
    }

    async fn execute_ingest(&self, fetcher: &Fetcher, query: &Query) -> Result<(), CliError> {
        let progress = create_spinner(format!("Ingesting {}", query.endpoint));
        let result = fetcher.ingest(query, self.max_pages).await;
        progress.finish_and_clear();

        let summary = result?;
        println!(
            "{}",
            json!({
                "endpoint": query.endpoint.to_string(),
                "pages": summary.pages,
                "fetched": summary.fetched,
                "stored": summary.stored,
            })
        );
        Ok(())
    }

    async fn execute_stream(&self, fetcher: &Fetcher, query: &Query) -> Result<(), CliError> {
        let mut pages = fetcher.stream(query, self.max_pages);
        while let Some(page) = pages.next().await {
            let page = page.map_err(crate::fetcher::FetcherError::from)?;
            println!("{}", serde_json::to_string(&page)?);
        }
        Ok(())
    }

    /// Same result as [`Fetcher::fetch_all`], drained here to tick the spinner per page
    async fn collect_items(&self, fetcher: &Fetcher, query: &Query) -> Result<Vec<RawItem>, CliError> {
        let progress = create_spinner(format!("Fetching {}", query.endpoint));
        let mut pages = fetcher.stream(query, self.max_pages);
        let mut items = Vec::new();
        let mut page_count = 0u32;

        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(err) => {
                    progress.finish_and_clear();
                    return Err(crate::fetcher::FetcherError::from(err).into());
                }
            };
            page_count += 1;
            items.extend(page.items);
            progress.set_message(format!(
                "Fetching {}: {} pages, {} items",
                query.endpoint,
                page_count,
                items.len()
            ));
        }

        progress.finish_and_clear();
        Ok(items)
    }
}

/// Spinner drawn on stderr so stdout stays machine-readable
fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
