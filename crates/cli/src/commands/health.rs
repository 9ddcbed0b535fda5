//! Agent health command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse};
use crate::output::{color_status, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show overall and per-component health. Fails when the agent is unhealthy.
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (status, health): (u16, HealthResponse) = client.get_any_status("healthz").await?;

    match format {
        OutputFormat::Json => print_json(&health),
        OutputFormat::Table => {
            println!("{} {}", "Monitor status:".bold(), color_status(&health.status));
            println!();

            let mut names: Vec<&String> = health.components.keys().collect();
            names.sort();
            let rows: Vec<ComponentRow> = names
                .into_iter()
                .map(|name| {
                    let component = &health.components[name];
                    ComponentRow {
                        name: name.clone(),
                        status: color_status(&component.status),
                        message: component.message.clone().unwrap_or_default(),
                    }
                })
                .collect();
            print_table(rows, &health.components, format);
        }
    }

    if status >= 500 {
        anyhow::bail!("monitor is {}", health.status);
    }
    Ok(())
}
