//! Feed listing and inspection commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, FeedDetail, FeedSummary};
use crate::output::{
    color_status, format_ms, format_optional_timestamp, format_timestamp, format_value,
    print_info, print_json, print_table, print_warning, OutputFormat,
};

/// How many of the most recent samples `feeds show` prints
const SAMPLE_ROWS: usize = 10;

#[derive(Tabled)]
struct FeedRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Rate")]
    rate: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Buffered")]
    buffered: String,
    #[tabled(rename = "Latency (avg)")]
    latency: String,
    #[tabled(rename = "Errors")]
    errors: String,
}

fn feed_status(feed: &FeedSummary) -> &'static str {
    if !feed.running {
        "stopped"
    } else if feed.consecutive_errors > 0 {
        "failing"
    } else if feed.latency.max_ms > feed.rate_ms as f64 {
        "behind"
    } else {
        "running"
    }
}

fn feed_row(feed: &FeedSummary) -> FeedRow {
    FeedRow {
        id: feed.id.clone(),
        label: feed.label.clone(),
        target: feed.target.clone(),
        rate: format_ms(feed.rate_ms as f64),
        status: color_status(feed_status(feed)),
        buffered: format!("{}/{}", feed.buffered, feed.capacity),
        latency: format_ms(feed.latency.mean_ms),
        errors: if feed.consecutive_errors > 0 {
            format!("{} ({} in a row)", feed.errors, feed.consecutive_errors)
                .red()
                .to_string()
        } else {
            feed.errors.to_string()
        },
    }
}

pub async fn list_feeds(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let feeds: Vec<FeedSummary> = client.get("api/v1/feeds").await?;

    let rows: Vec<FeedRow> = feeds.iter().map(feed_row).collect();
    print_table(rows, &feeds, format);

    if format == OutputFormat::Table && !feeds.is_empty() {
        println!("\nTotal: {} feeds", feeds.len());
    }
    Ok(())
}

pub async fn show_feed(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let path = format!("api/v1/feeds/{}", id);
    let detail: FeedDetail = client.get(&path).await?;

    if format == OutputFormat::Json {
        print_json(&detail);
        return Ok(());
    }

    let stats = &detail.stats;
    println!("{}", stats.label.bold());
    println!("{}", "=".repeat(60));
    println!("ID:           {}", stats.id.cyan());
    println!("Target:       {} ({})", stats.target.cyan(), stats.address);
    println!("Status:       {}", color_status(feed_status(stats)));
    println!("Rate:         {}", format_ms(stats.rate_ms as f64));
    println!("Buffered:     {}/{}", stats.buffered, stats.capacity);
    println!("Listeners:    {}", stats.listeners);
    println!(
        "Latency:      min {} / avg {} / max {}",
        format_ms(stats.latency.min_ms),
        format_ms(stats.latency.mean_ms),
        format_ms(stats.latency.max_ms)
    );
    println!("Range:        {} .. {}", detail.min, detail.max);
    println!(
        "Started:      {}",
        format_optional_timestamp(detail.feed_start_time.as_ref())
    );
    println!(
        "Last data:    {}",
        format_optional_timestamp(detail.last_data_arrived.as_ref())
    );
    if let Some(error) = &stats.last_error {
        println!("Last error:   {}", error.red());
    }
    println!("Query:        {}", detail.query.dimmed());
    println!();

    if let Some(range) = &detail.display_range {
        print_info(&format!(
            "Showing {} to {}",
            format_timestamp(&range.start),
            format_timestamp(&range.end)
        ));
    }

    if detail.samples.is_empty() {
        print_warning("No samples in the current window");
        return Ok(());
    }

    let mut builder = tabled::builder::Builder::default();
    let mut header = vec!["Timestamp".to_string()];
    header.extend(detail.columns.iter().cloned());
    builder.push_record(header);

    let skip = detail.samples.len().saturating_sub(SAMPLE_ROWS);
    for sample in detail.samples.iter().skip(skip) {
        let mut record = vec![format_timestamp(&sample.timestamp)];
        for column in &detail.columns {
            record.push(
                sample
                    .data
                    .get(column)
                    .map(format_value)
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
        builder.push_record(record);
    }

    let table = builder
        .build()
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
    println!(
        "\nShowing {} of {} samples",
        detail.samples.len() - skip,
        detail.samples.len()
    );

    Ok(())
}
