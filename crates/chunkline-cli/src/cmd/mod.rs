pub mod ingest;
pub mod status;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

/// Print a table with a cyan header row on stderr
pub fn print_table(header: &[&str], rows: impl IntoIterator<Item = Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    for row in rows {
        table.add_row(row);
    }
    eprintln!("\n{table}");
}
