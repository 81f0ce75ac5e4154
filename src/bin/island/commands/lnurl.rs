//! LNURL command - bech32 encode/decode diagnostics

use crate::style::*;
use anyhow::Result;

pub fn encode(url: &str) -> Result<()> {
    let lnurl = island_rewards::encode_lnurl(url)?;
    println!("{}", lnurl);
    Ok(())
}

pub fn decode(lnurl: &str) -> Result<()> {
    let url = island_rewards::decode_lnurl(lnurl)?;
    if !url.starts_with("https://") && !url.contains(".onion") {
        print_warning("Decoded URL is neither https nor onion");
    }
    println!("{}", url);
    Ok(())
}
