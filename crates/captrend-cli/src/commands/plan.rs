use captrend::clock::SystemClock;
use captrend::compaction::{GroupSummary, Partition};
use captrend::config::Config;
use captrend::pipeline::{CompactionRun, RunOptions};
use captrend::storage::LanceStore;
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_timestamp};

#[derive(Parser)]
pub struct PlanCommand {
    #[clap(long, help = "Collection to plan (default from config)")]
    pub collection: Option<String>,

    #[clap(long, help = "Only list groups that would lose observations")]
    pub changes_only: bool,
}

impl PlanCommand {
    pub async fn execute(
        &self,
        store: &LanceStore,
        config: &Config,
        format: OutputFormat,
    ) -> CliResult<()> {
        let options = RunOptions::from_config(config, self.collection.as_deref());
        let clock = SystemClock;
        let run = CompactionRun::new(store, &clock, options);
        let planned = run
            .plan()
            .await
            .map_err(|e| CliError::in_collection(&run.options().collection, e))?;

        let groups: Vec<&GroupSummary> = planned
            .plan
            .groups
            .iter()
            .filter(|g| !self.changes_only || g.members > g.kept)
            .collect();

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "collection": run.options().collection,
                    "now": planned.now,
                    "cutoff": planned.plan.cutoff,
                    "loaded": planned.loaded.len(),
                    "skipped": planned.loaded.skipped,
                    "old": planned.plan.old,
                    "recent": planned.plan.recent,
                    "kept": planned.plan.keep.len(),
                    "deletions": planned.delete_set.len(),
                    "groups": groups,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Retention plan for '{}'", run.options().collection);
                println!("======================\n");
                println!(
                    "Cutoff: {} (recent window {} days)\n",
                    format_timestamp(&planned.plan.cutoff),
                    run.options().policy.recent_window_days
                );

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Partition", "Host", "Pool", "Day", "Members", "Keep", "Delete"]);

                for g in &groups {
                    table.add_row([
                        partition_label(g.partition).to_string(),
                        g.hostid.clone(),
                        g.pool.clone(),
                        g.day.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                        g.members.to_string(),
                        g.kept.to_string(),
                        (g.members - g.kept).to_string(),
                    ]);
                }

                println!("{table}\n");

                println!(
                    "Old: {} groups, keep {} of {}",
                    planned.plan.old.groups, planned.plan.old.kept, planned.plan.old.observations
                );
                println!(
                    "Recent: {} series, keep {} of {}",
                    planned.plan.recent.groups,
                    planned.plan.recent.kept,
                    planned.plan.recent.observations
                );
                println!(
                    "Total: keep {}, delete {} ({} skipped at load)",
                    planned.plan.keep.len(),
                    planned.delete_set.len(),
                    planned.loaded.skipped
                );
            }
        }

        Ok(())
    }
}

fn partition_label(partition: Partition) -> &'static str {
    match partition {
        Partition::Old => "old",
        Partition::Recent => "recent",
    }
}
