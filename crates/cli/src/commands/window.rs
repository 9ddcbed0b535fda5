//! Shared time window commands

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::client::{ApiClient, TimeRange, WindowRequest, WindowResponse};
use crate::output::{format_timestamp, print_info, print_json, print_success, OutputFormat};

fn describe(range: &TimeRange) -> String {
    let span = range.end - range.start;
    format!(
        "{} to {} ({}s)",
        format_timestamp(&range.start),
        format_timestamp(&range.end),
        span.num_seconds()
    )
}

pub async fn get_window(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: WindowResponse = client.get("api/v1/window").await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => match &response.window {
            Some(range) => print_info(&format!("Time window: {}", describe(range))),
            None => print_info("No time window set; charts follow live data"),
        },
    }
    Ok(())
}

pub async fn set_window(
    client: &ApiClient,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    format: OutputFormat,
) -> Result<()> {
    let request = WindowRequest { start, end };
    let response: WindowResponse = client.put("api/v1/window", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            if let Some(range) = &response.window {
                print_success(&format!("Time window set: {}", describe(range)));
            }
        }
    }
    Ok(())
}

pub async fn clear_window(client: &ApiClient, format: OutputFormat) -> Result<()> {
    client.delete("api/v1/window").await?;

    match format {
        OutputFormat::Json => print_json(&WindowResponse { window: None }),
        OutputFormat::Table => print_success("Time window cleared"),
    }
    Ok(())
}
