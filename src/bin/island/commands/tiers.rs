//! Tiers command - list reward tiers

use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str) -> Result<()> {
    print_header("Reward Tiers");

    let client = crate::client::RewardsClient::new(server);
    let tiers = client.get_tiers().await?;

    if tiers.is_empty() {
        print_warning("Server reported no reward tiers.");
        return Ok(());
    }

    println!();
    for tier in tiers {
        let range = match tier.max_score {
            Some(max) => format!("{} - {}", tier.min_score, max.saturating_sub(1)),
            None => format!("{}+", tier.min_score),
        };
        println!(
            "  {:<18} {:>10}  {}",
            range,
            style_green(&format_sats(tier.satoshis)),
            style_dim(&tier.description)
        );
    }

    Ok(())
}
