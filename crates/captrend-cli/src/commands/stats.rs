use std::collections::BTreeMap;

use captrend::observation::{Loader, Observation, SeriesKey};
use captrend::storage::LanceStore;
use chrono::NaiveDateTime;
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_timestamp};

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(long, help = "Collection to inspect (default from config)")]
    pub collection: Option<String>,
}

/// Observation counts for one host and pool
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesStats {
    pub hostid: String,
    pub pool: String,
    pub observations: usize,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub latest_perc_used: f64,
}

impl StatsCommand {
    pub async fn execute(
        &self,
        store: &LanceStore,
        default_collection: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        let collection = self.collection.as_deref().unwrap_or(default_collection);
        let loaded = Loader::new(store)
            .load(collection)
            .await
            .map_err(|e| CliError::in_collection(collection, e))?;
        let series = summarize(&loaded.observations);

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "collection": collection,
                    "fetched": loaded.fetched,
                    "loaded": loaded.len(),
                    "skipped": loaded.skipped,
                    "series": series,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Collection '{collection}'");
                println!("======================\n");

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Host", "Pool", "Count", "First", "Last", "Latest %"]);

                for s in &series {
                    table.add_row([
                        s.hostid.clone(),
                        s.pool.clone(),
                        s.observations.to_string(),
                        format_timestamp(&s.first),
                        format_timestamp(&s.last),
                        format!("{:.2}", s.latest_perc_used),
                    ]);
                }

                println!("{table}\n");

                println!(
                    "Total: {} observations in {} series ({} fetched, {} skipped)",
                    loaded.len(),
                    series.len(),
                    loaded.fetched,
                    loaded.skipped
                );
            }
        }

        Ok(())
    }
}

/// Per-series counts and time span, ordered by host then pool
pub fn summarize(observations: &[Observation]) -> Vec<SeriesStats> {
    let mut by_series: BTreeMap<SeriesKey, SeriesStats> = BTreeMap::new();

    for o in observations {
        by_series
            .entry(o.series_key())
            .and_modify(|s| {
                s.observations += 1;
                if o.timestamp < s.first {
                    s.first = o.timestamp;
                }
                if o.timestamp >= s.last {
                    s.last = o.timestamp;
                    s.latest_perc_used = o.perc_used;
                }
            })
            .or_insert_with(|| SeriesStats {
                hostid: o.hostid.clone(),
                pool: o.pool.clone(),
                observations: 1,
                first: o.timestamp,
                last: o.timestamp,
                latest_perc_used: o.perc_used,
            });
    }

    by_series.into_values().collect()
}
