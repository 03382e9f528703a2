use captrend::storage::LanceStore;
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};

#[derive(Parser)]
pub struct AuditCommand {
    #[clap(long, short = 'n', default_value = "50", help = "Maximum number of records")]
    pub limit: usize,

    #[clap(long, help = "Show only the record for this document id")]
    pub doc_id: Option<String>,
}

impl AuditCommand {
    pub async fn execute(
        &self,
        store: &LanceStore,
        audit_table: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        if self.limit == 0 {
            return Err("--limit must be at least 1".into());
        }

        let records = store
            .list_deletions(audit_table, self.doc_id.as_deref(), Some(self.limit))
            .await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
            OutputFormat::Table => {
                if records.is_empty() {
                    println!("No deletions recorded in '{audit_table}'.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Document", "Deleted At"]);

                for record in &records {
                    table.add_row([truncate_string(&record.doc_id, 48), record.deleted_at.clone()]);
                }

                println!("{table}\n");
                println!("Showing {} records from '{audit_table}'", records.len());
            }
        }

        Ok(())
    }
}
