//! Claim Wizard - Interactive reward claim
//!
//! Requests a proof-of-work challenge for a score, solves it locally and
//! exchanges the solution for an LNURL-withdraw code.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use island_rewards::{get_reward_tier, is_valid_pubkey, truncate_pubkey, MIN_REWARD_SCORE};
use std::time::Duration;

use crate::client::{ChallengeRequest, ClaimRequest, RewardsClient};
use crate::commands::solve::solve_with_spinner;
use crate::style::format_sats;

const SVG_DATA_URL_PREFIX: &str = "data:image/svg+xml;base64,";

pub async fn run_claim_wizard(
    server: &str,
    pubkey: Option<String>,
    score: Option<u64>,
    level: Option<u32>,
) -> Result<()> {
    crate::print_banner();
    println!("{}", style("  Reward Claim Wizard").cyan().bold());
    println!(
        "  {}",
        style("Turn your Satoshi Stacker score into sats").dim()
    );
    println!();

    // Step 1: Identity
    println!("  {}", style("Step 1: Nostr Pubkey").bold());
    println!("  {}", style("(64-char hex, not npub)").dim());
    println!();

    let pubkey = match pubkey {
        Some(pk) if is_valid_pubkey(&pk) => pk.to_lowercase(),
        Some(_) => bail!("Invalid pubkey: expected 64 hex characters"),
        None => Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("  Pubkey")
            .validate_with(|input: &String| -> Result<(), &str> {
                if is_valid_pubkey(input.trim()) {
                    Ok(())
                } else {
                    Err("Pubkey must be 64 hex characters")
                }
            })
            .interact_text()?
            .trim()
            .to_lowercase(),
    };

    println!(
        "  {} Pubkey: {}",
        style("✓").green(),
        style(truncate_pubkey(&pubkey)).cyan()
    );

    // Step 2: Score
    println!();
    println!("  {}", style("Step 2: Game Result").bold());
    println!();

    let score = match score {
        Some(s) => s,
        None => Input::<u64>::with_theme(&ColorfulTheme::default())
            .with_prompt("  Score")
            .interact_text()?,
    };
    let level = match level {
        Some(l) => l,
        None => Input::<u32>::with_theme(&ColorfulTheme::default())
            .with_prompt("  Level reached")
            .default(1)
            .interact_text()?,
    };

    let tier = match get_reward_tier(score) {
        Some(tier) => tier,
        None => {
            println!();
            println!(
                "  {} Scores below {} do not earn a reward",
                style("✗").red(),
                MIN_REWARD_SCORE
            );
            return Ok(());
        }
    };

    // Step 3: Review
    println!();
    println!("  {}", style("Review Claim").bold());
    println!("  {}", style("─".repeat(40)).dim());
    println!();
    println!("  Pubkey:   {}", truncate_pubkey(&pubkey));
    println!("  Score:    {} (level {})", score, level);
    println!(
        "  Reward:   {} {}",
        style(format_sats(tier.satoshis)).green().bold(),
        style(format!("({})", tier.description)).dim()
    );
    println!();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("  Claim this reward?")
        .default(true)
        .interact()?;

    if !confirmed {
        println!();
        println!("  {} Claim cancelled", style("✗").red());
        return Ok(());
    }

    // Step 4: Challenge
    println!();
    let client = RewardsClient::new(server);
    let pb = spinner("Requesting challenge...");
    let issued = client
        .request_challenge(&ChallengeRequest {
            pubkey: &pubkey,
            score,
            level,
        })
        .await;
    pb.finish_and_clear();
    let issued = issued?;

    println!(
        "  {} Difficulty {} ({})",
        style("✓").green(),
        style(issued.challenge.difficulty).cyan(),
        issued.estimated_solve_time
    );

    // Step 5: Solve
    let (solution, elapsed) = match solve_with_spinner(issued.challenge).await {
        Some(solved) => solved,
        None => {
            println!("  {} Solving cancelled", style("✗").red());
            return Ok(());
        }
    };
    println!(
        "  {} Solved in {:.2}s (nonce {})",
        style("✓").green(),
        elapsed.as_secs_f64(),
        solution.nonce
    );

    // Step 6: Claim
    let pb = spinner("Submitting claim...");
    let receipt = client
        .claim(&ClaimRequest {
            pubkey: &pubkey,
            score,
            solution: &solution,
        })
        .await;
    pb.finish_and_clear();
    let receipt = receipt?;

    println!();
    println!("  {}", style("═".repeat(50)).dim());
    println!();
    println!(
        "  {} {} earned ({})",
        style("✓").green().bold(),
        style(format_sats(receipt.amount)).green().bold(),
        receipt.tier
    );
    println!();
    println!("  Scan or paste into a Lightning wallet:");
    println!();
    println!("  {}", style(&receipt.lnurl).cyan());
    println!();
    println!(
        "  {}",
        style(format!("Pull payment {}", receipt.pull_payment_id)).dim()
    );
    println!("  {}", style(format!("Claim {}", receipt.claim_id)).dim());
    println!();

    let save = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("  Save QR code as SVG?")
        .default(false)
        .interact()?;
    if save {
        let path = format!("island-reward-{}.svg", &receipt.claim_id);
        let svg = decode_svg_data_url(&receipt.qr_code_url)?;
        std::fs::write(&path, svg).with_context(|| format!("Failed to write {}", path))?;
        println!("  {} Saved {}", style("✓").green(), style(&path).cyan());
    }

    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn decode_svg_data_url(data_url: &str) -> Result<Vec<u8>> {
    let encoded = data_url
        .strip_prefix(SVG_DATA_URL_PREFIX)
        .context("QR code is not an SVG data URL")?;
    Ok(STANDARD.decode(encoded)?)
}
