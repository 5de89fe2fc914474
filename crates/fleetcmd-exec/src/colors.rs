//! Terminal colors for output prefixes

use owo_colors::{AnsiColors, OwoColorize};

/// Palette hosts are spread across
const HOST_PALETTE: [AnsiColors; 9] = [
    AnsiColors::Cyan,
    AnsiColors::Yellow,
    AnsiColors::Magenta,
    AnsiColors::Blue,
    AnsiColors::BrightGreen,
    AnsiColors::BrightYellow,
    AnsiColors::BrightBlue,
    AnsiColors::BrightMagenta,
    AnsiColors::BrightCyan,
];

fn colors_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
        && std::env::var("TERM").map(|t| t != "dumb").unwrap_or(true)
}

/// 32-bit FNV-1a
fn fnv1a(data: &[u8]) -> u32 {
    data.iter().fold(0x811c_9dc5_u32, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

/// Stable palette color for a host
#[must_use]
pub fn host_color(host: &str) -> AnsiColors {
    HOST_PALETTE[fnv1a(host.as_bytes()) as usize % HOST_PALETTE.len()]
}

/// Host name in its palette color
#[must_use]
pub fn paint_host(host: &str) -> String {
    if !colors_enabled() {
        return host.to_string();
    }
    host.color(host_color(host)).to_string()
}

#[must_use]
pub fn paint_error(text: &str) -> String {
    if !colors_enabled() {
        return text.to_string();
    }
    text.red().to_string()
}

#[must_use]
pub fn paint_ok(text: &str) -> String {
    if !colors_enabled() {
        return text.to_string();
    }
    text.green().to_string()
}

#[must_use]
pub fn paint_strong(text: &str) -> String {
    if !colors_enabled() {
        return text.to_string();
    }
    text.bold().to_string()
}
