//! Terminal styling utilities

use console::style;

pub fn style_cyan(s: &str) -> String {
    style(s).cyan().to_string()
}

pub fn style_green(s: &str) -> String {
    style(s).green().to_string()
}

pub fn style_yellow(s: &str) -> String {
    style(s).yellow().to_string()
}

pub fn style_dim(s: &str) -> String {
    style(s).dim().to_string()
}

pub fn style_bold(s: &str) -> String {
    style(s).bold().to_string()
}

pub fn print_success(msg: &str) {
    println!("{} {}", style_green("✓"), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("✗").red(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", style_yellow("⚠"), msg);
}

pub fn print_info(msg: &str) {
    println!("{} {}", style_cyan("ℹ"), msg);
}

pub fn print_header(title: &str) {
    println!();
    println!("{}", style_bold(title));
    println!("{}", "─".repeat(title.chars().count()));
}

/// Sats with a thousands separator, e.g. `2,100 sats`
pub fn format_sats(sats: u64) -> String {
    let digits = sats.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{} sats", out)
}
