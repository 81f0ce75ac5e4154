//! Config command - show rewards server configuration

use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str) -> Result<()> {
    print_header("Rewards Configuration");

    let client = crate::client::RewardsClient::new(server);
    let config = client.get_config().await?;

    println!();
    println!("Server:           {}", style_cyan(server));
    println!(
        "Version:          {}",
        config["version"].as_str().unwrap_or("?")
    );

    let enabled = config["withdrawals_enabled"].as_bool().unwrap_or(false);
    println!(
        "Withdrawals:      {}",
        if enabled {
            style_green(config["mode"].as_str().unwrap_or("enabled"))
        } else {
            style_yellow("disabled")
        }
    );

    println!();
    println!("{}", style_bold("Limits:"));
    if let Some(difficulty) = config["max_difficulty"].as_u64() {
        println!("  Max difficulty:   {}", difficulty);
    }
    if let Some(validity) = config["challenge_validity_ms"].as_u64() {
        println!("  Challenge valid:  {}s", validity / 1000);
    }
    if let Some(per_hour) = config["max_claims_per_hour"].as_u64() {
        println!("  Claims per hour:  {}", per_hour);
    }

    Ok(())
}
