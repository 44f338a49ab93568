//! Fixed-width text rendering of fleet snapshots
//!
//! Output depends only on the snapshot and the page: same input, same bytes.

use crate::fleet::{FleetSnapshot, FleetTotals};

/// Rows per dashboard page
pub const PAGE_SIZE: usize = 10;

const ID_WIDTH: usize = 3;
const PING_WIDTH: usize = 4;
const GUILDS_WIDTH: usize = 6;
const USERS_WIDTH: usize = 7;
const MEM_WIDTH: usize = 5;
const UP_WIDTH: usize = 6;

const TABLE_WIDTH: usize =
    ID_WIDTH + 1 + PING_WIDTH + 1 + GUILDS_WIDTH + 1 + USERS_WIDTH + 1 + MEM_WIDTH + 1 + UP_WIDTH;

/// Pages needed for `rows` rows; at least one, even when empty
pub fn total_pages(rows: usize) -> usize {
    rows.div_ceil(PAGE_SIZE).max(1)
}

/// Coarsest non-zero unit: `1d4h`, `3h12m` or `7m`
pub fn format_uptime(uptime_ms: u64) -> String {
    let secs = uptime_ms / 1000;
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    if days > 0 {
        format!("{days}d{hours}h")
    } else if hours > 0 {
        format!("{hours}h{minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// `1234567` → `1,234,567`
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// One-line fleet summary shown above the table
pub fn summary_line(totals: &FleetTotals) -> String {
    let ping = totals
        .avg_ping_ms
        .map(|p| format!("{p}ms"))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        "**Active:** {} | **Avg ping:** {} | **Guilds:** {} | **Users:** {} | **RAM:** {} MB",
        totals.shards,
        ping,
        group_thousands(totals.guilds),
        group_thousands(totals.members),
        group_thousands(totals.memory_mb),
    )
}

/// `Page 2/3`
pub fn page_label(page: usize, total: usize) -> String {
    format!("Page {}/{}", page + 1, total)
}

/// Code-fenced table of one page
pub fn render_table(snapshot: &FleetSnapshot, page: usize) -> String {
    let mut out = String::from("```text\n");

    out.push_str(&format!(
        "{:>ID_WIDTH$} {:>PING_WIDTH$} {:>GUILDS_WIDTH$} {:>USERS_WIDTH$} {:>MEM_WIDTH$} {:>UP_WIDTH$}\n",
        "#", "PING", "GUILDS", "USERS", "MEM", "UP"
    ));
    out.push_str(&"-".repeat(TABLE_WIDTH));
    out.push('\n');

    for row in snapshot.page(page, PAGE_SIZE) {
        let ping = if row.ping_ms < 0 {
            "?".to_string()
        } else {
            row.ping_ms.to_string()
        };
        out.push_str(&format!(
            "{:>ID_WIDTH$} {:>PING_WIDTH$} {:>GUILDS_WIDTH$} {:>USERS_WIDTH$} {:>MEM_WIDTH$} {:>UP_WIDTH$}\n",
            row.shard_id,
            ping,
            row.guild_count,
            row.member_count,
            row.memory_mb,
            format_uptime(row.uptime_ms),
        ));
    }

    out.push_str("```");
    out
}
