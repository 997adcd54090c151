//! Delivery log commands

use std::sync::Arc;

use colored::Colorize;

use crate::interfaces::cli::CliError;
use crate::services::DeliveryService;
use crate::storage::models::{DeliveryFilter, DeliveryStatus};

pub async fn list_deliveries(
    service: Arc<DeliveryService>,
    filter: DeliveryFilter,
    json: bool,
) -> Result<(), CliError> {
    let items = service.list(&filter).await?;

    if json {
        let out = serde_json::to_string_pretty(&items)
            .map_err(|e| CliError::CommandError(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    if items.is_empty() {
        println!("{} No deliveries found", "ℹ".bold().blue());
        return Ok(());
    }

    for d in &items {
        let status = match d.status {
            DeliveryStatus::Success => d.status.to_string().green(),
            DeliveryStatus::HttpError => d.status.to_string().yellow(),
            DeliveryStatus::TransportError | DeliveryStatus::RenderError => {
                d.status.to_string().red()
            }
        };
        let code = d
            .response_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} profile={} attempt {}/{} {} {} {}",
            format!("#{}", d.id).cyan(),
            d.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            d.profile_id,
            d.attempt,
            d.max_attempts,
            status,
            code,
            d.request_url.blue()
        );
        if let Some(ref err) = d.error {
            println!("      {}", err.dimmed());
        }
        if let Some(next) = d.next_retry_at {
            println!(
                "      {} {}",
                "next retry:".dimmed(),
                next.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }
    println!();
    println!(
        "{} {} deliveries",
        "ℹ".bold().blue(),
        items.len().to_string().green()
    );
    Ok(())
}

pub async fn retry_delivery(service: Arc<DeliveryService>, id: i64) -> Result<(), CliError> {
    let triggered = service.retry(id).await?;
    println!(
        "{} Delivery {} queued for redelivery as chain {}",
        "✓".green(),
        triggered.delivery_id.to_string().cyan(),
        triggered.chain_id.yellow()
    );
    println!(
        "  {}",
        "A running clicktrail server picks it up on its next poll".dimmed()
    );
    Ok(())
}
