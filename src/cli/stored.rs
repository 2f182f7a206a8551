//! CLI command for reading records back from the local store

use clap::Args;
use tracing::debug;

use super::{Cli, CliError};
use crate::page::PaginationCursor;
use crate::storage::{QueryCriteria, RecordStore, StoragePager};
use crate::Endpoint;

/// Output format for the stored command
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Stored command arguments
#[derive(Args, Debug)]
pub struct StoredArgs {
    /// Only records fetched from this endpoint
    #[arg(long)]
    pub endpoint: Option<Endpoint>,

    /// City (case-insensitive)
    #[arg(long)]
    pub city: Option<String>,

    /// State code (case-insensitive)
    #[arg(long)]
    pub state: Option<String>,

    /// ZIP code
    #[arg(long)]
    pub zip_code: Option<String>,

    /// Property type (repeatable)
    #[arg(long = "property-type")]
    pub property_types: Vec<String>,

    /// Minimum price
    #[arg(long)]
    pub min_price: Option<f64>,

    /// Maximum price
    #[arg(long)]
    pub max_price: Option<f64>,

    /// Minimum bedrooms
    #[arg(long)]
    pub min_bedrooms: Option<f64>,

    /// Records to skip
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub offset: i64,

    /// Records per page
    #[arg(long, default_value_t = 50, allow_hyphen_values = true)]
    pub limit: i64,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    pub format: OutputFormat,
}

impl StoredArgs {
    fn criteria(&self) -> QueryCriteria {
        let mut criteria = QueryCriteria::new();
        if let Some(endpoint) = self.endpoint {
            criteria = criteria.source(endpoint.source_label());
        }
        if let Some(city) = &self.city {
            criteria = criteria.city(city.clone());
        }
        if let Some(state) = &self.state {
            criteria = criteria.state(state.clone());
        }
        if let Some(zip_code) = &self.zip_code {
            criteria = criteria.zip_code(zip_code.clone());
        }
        for property_type in &self.property_types {
            criteria = criteria.property_type(property_type.clone());
        }
        if let Some(min_bedrooms) = self.min_bedrooms {
            criteria = criteria.min_bedrooms(min_bedrooms);
        }
        criteria.price_range(self.min_price, self.max_price)
    }

    /// Execute the stored command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config()?;
        let cursor = PaginationCursor::new(self.offset, self.limit);

        // Reject bad paging before opening the database
        cursor.validate(config.max_page_size)?;

        let store = RecordStore::connect(&config.database_url).await?;
        let pager = StoragePager::new(store, config.max_page_size);
        let criteria = self.criteria();
        debug!(?criteria, offset = self.offset, limit = self.limit, "Reading stored page");

        match self.format {
            OutputFormat::Json => {
                let page = pager.paginate(&criteria, &cursor).await?;
                println!("{}", serde_json::to_string_pretty(&page)?);
            }
            OutputFormat::Human => {
                let page = pager.paginate_records(&criteria, &cursor).await?;
                let total = page.total_count.unwrap_or(0);

                if page.is_empty() {
                    println!("No stored records (total {total})");
                    return Ok(());
                }

                println!(
                    "Records {}-{} of {}:\n",
                    page.offset + 1,
                    page.offset + page.len() as u64,
                    total
                );
                for record in &page.items {
                    let location = [
                        record.city.as_deref(),
                        record.state.as_deref(),
                        record.zip_code.as_deref(),
                    ]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                    let price = record
                        .price
                        .map(|p| format!("{p:.0}"))
                        .unwrap_or_else(|| "-".to_string());

                    println!(
                        "{} | {} | {} | {} | price={}",
                        record.source,
                        record.record_id,
                        location,
                        record.property_type.as_deref().unwrap_or("-"),
                        price
                    );
                }
                if let Some(next) = page.next_offset {
                    println!("\nMore records available: --offset {next}");
                }
            }
        }

        Ok(())
    }
}
