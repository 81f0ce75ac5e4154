//! Solve command - offline proof-of-work solver

use crate::style::*;
use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use island_rewards::pow::{target_for, MAX_DIFFICULTY};
use island_rewards::{estimate_solve_time, ProofOfWorkChallenge, SolverHandle};
use std::time::{Duration, Instant};

pub async fn run(challenge: &str, difficulty: u32) -> Result<()> {
    if difficulty == 0 || difficulty > MAX_DIFFICULTY {
        bail!("Difficulty must be between 1 and {}", MAX_DIFFICULTY);
    }

    print_header("Proof of Work");
    println!("Challenge:  {}", style_dim(challenge));
    println!("Difficulty: {} ({})", difficulty, estimate_solve_time(difficulty));
    println!();

    let challenge = ProofOfWorkChallenge {
        challenge: challenge.to_string(),
        difficulty,
        timestamp: chrono::Utc::now().timestamp_millis(),
        target: target_for(difficulty),
    };

    let solution = solve_with_spinner(challenge).await;
    match solution {
        Some((solution, elapsed)) => {
            print_success(&format!("Solved in {:.2}s", elapsed.as_secs_f64()));
            println!("Nonce: {}", style_bold(&solution.nonce.to_string()));
            println!("Hash:  {}", style_green(&solution.hash));
            Ok(())
        }
        None => {
            print_warning("Cancelled");
            Ok(())
        }
    }
}

/// Run the solver behind a spinner; Ctrl-C cancels it.
pub async fn solve_with_spinner(
    challenge: ProofOfWorkChallenge,
) -> Option<(island_rewards::ProofOfWorkSolution, Duration)> {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message("Solving challenge... (Ctrl-C to cancel)");
    pb.enable_steady_tick(Duration::from_millis(80));

    let started = Instant::now();
    let handle = SolverHandle::spawn(challenge);
    let cancel = handle.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let solution = handle.join().await;
    interrupt.abort();
    pb.finish_and_clear();

    solution.map(|s| (s, started.elapsed()))
}
