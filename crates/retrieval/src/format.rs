//! Human-facing rendering of queries and row sets.

use regex_lite::{Captures, Regex};
use safeq_core::store::RowSet;
use std::fmt::Write;
use std::sync::LazyLock;

/// Context text for a query that ran but matched nothing.
pub const NO_ROWS: &str = "No rows found for this query.";

static CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(LEFT\s+JOIN|INNER\s+JOIN|ORDER\s+BY|GROUP\s+BY|SELECT|FROM|WHERE|JOIN|HAVING|LIMIT)\b",
    )
    .unwrap()
});

/// Break a statement before each major clause keyword.
///
/// Display only: the raw statement is what gets executed.
pub fn pretty_print(sql: &str) -> String {
    let broken = CLAUSE.replace_all(sql, |caps: &Captures<'_>| {
        let keyword: Vec<String> = caps[1]
            .split_whitespace()
            .map(str::to_uppercase)
            .collect();
        format!("\n{}", keyword.join(" "))
    });

    broken
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render rows under the default "Query results" title.
pub fn format_rows(rows: &RowSet, cap: usize) -> String {
    format_rows_titled("Query results", rows, cap)
}

/// Render at most `cap` rows as labeled blocks of `column: value` lines.
///
/// Null cells are left out. When rows are cut, one closing line says how
/// many were not shown.
pub fn format_rows_titled(title: &str, rows: &RowSet, cap: usize) -> String {
    if rows.is_empty() {
        return NO_ROWS.to_string();
    }

    let total = rows.len();
    let label = if total == 1 { "row" } else { "rows" };
    let mut out = format!("## {title} ({total} {label}):\n");

    for index in 0..total.min(cap) {
        let _ = write!(out, "\n### Row {}:\n", index + 1);
        for (column, value) in rows.named(index).filter(|(_, v)| !v.is_null()) {
            let _ = writeln!(out, "  - {column}: {value}");
        }
    }

    if total > cap {
        let _ = write!(out, "\n... {} more rows not shown.\n", total - cap);
    }

    out
}
