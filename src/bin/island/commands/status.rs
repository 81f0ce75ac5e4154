//! Status command - claimed scores and rate-limit state

use crate::style::*;
use anyhow::Result;
use island_rewards::truncate_pubkey;

pub async fn run(server: &str, pubkey: &str) -> Result<()> {
    print_header("Player Status");

    println!("Pubkey: {}", truncate_pubkey(pubkey));
    println!();

    let client = crate::client::RewardsClient::new(server);
    let status = client.get_status(pubkey).await?;

    if status.claimed_scores.is_empty() {
        print_info("No rewards claimed yet.");
    } else {
        print_success(&format!(
            "{} reward(s) claimed",
            status.claimed_scores.len()
        ));
        println!();
        for score in &status.claimed_scores {
            println!(
                "  {:>10}  {}",
                style_bold(&score.to_string()),
                style_green(&format_sats(island_rewards::get_reward_amount(*score)))
            );
        }
    }

    println!();
    println!(
        "Attempts (1h):    {}",
        if status.rate_limited {
            style_yellow(&status.attempts_last_hour.to_string())
        } else {
            style_dim(&status.attempts_last_hour.to_string())
        }
    );
    if status.rate_limited {
        println!();
        print_warning("Too many recent claim attempts. Wait before claiming again.");
    }

    Ok(())
}
