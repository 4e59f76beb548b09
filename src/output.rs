use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use core_types::{LedgerEntry, RateSample};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn samples_table(samples: &[RateSample]) -> Table {
    let mut table = new_table(vec!["Time", "Ticker", "Base", "Rate"]);
    for s in samples {
        table.add_row(vec![
            Cell::new(s.timestamp.to_rfc3339()),
            Cell::new(&s.ticker),
            Cell::new(&s.base),
            Cell::new(format!("{:.6}", s.rate)).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn entries_table(entries: &[LedgerEntry]) -> Table {
    let mut table = new_table(vec!["Id", "Executed", "Trade", "Type", "Currency", "Amount"]);
    for e in entries {
        table.add_row(vec![
            Cell::new(e.id),
            Cell::new(e.executed_at.to_rfc3339()),
            Cell::new(e.trade_id),
            Cell::new(format!("{:?}", e.entry_type)),
            Cell::new(&e.currency),
            Cell::new(e.amount).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn samples_table_lists_every_row() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let samples = vec![
            RateSample { ticker: "EUR".into(), base: "USD".into(), rate: 0.9, timestamp: at },
            RateSample { ticker: "EUR".into(), base: "USD".into(), rate: 0.91, timestamp: at },
        ];
        let rendered = samples_table(&samples).to_string();
        assert!(rendered.contains("0.900000"));
        assert!(rendered.contains("0.910000"));
        assert!(rendered.contains("Ticker"));
    }
}
