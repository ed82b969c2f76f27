use anyhow::Result;
use chrono::SecondsFormat;
use serde::Serialize;
use swarmcd_core::ledger::{RevisionLedger, StackMetadata};

const HEADERS: [&str; 5] = ["STACK", "REVISION", "STACK REVISION", "HASH", "DEPLOYED AT"];

#[derive(Serialize)]
struct Record<'a> {
    stack: &'a str,
    #[serde(flatten)]
    metadata: &'a StackMetadata,
}

pub fn run(db: &str, json: bool) -> Result<()> {
    let ledger = RevisionLedger::open(db)?;
    let records = ledger.list_all()?;

    if json {
        let out: Vec<Record<'_>> = records
            .iter()
            .map(|(stack, metadata)| Record { stack, metadata })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No deployments recorded.");
        return Ok(());
    }

    print!("{}", render_table(&records));
    Ok(())
}

fn cells(stack: &str, m: &StackMetadata) -> [String; 5] {
    [
        stack.to_string(),
        m.repo_revision.clone(),
        m.deployed_stack_revision.clone(),
        m.short_hash().to_string(),
        m.deployed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    ]
}

/// Ledger records as an aligned table, one line per stack, with a dashed
/// rule under the headers. Hashes are shortened.
fn render_table(records: &[(String, StackMetadata)]) -> String {
    let rows: Vec<[String; 5]> = records.iter().map(|(s, m)| cells(s, m)).collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = line(&widths, &HEADERS);
    out.push_str(&line(&widths, &widths.map(|w| "-".repeat(w))));
    for row in &rows {
        out.push_str(&line(&widths, row));
    }
    out
}

fn line<S: AsRef<str>>(widths: &[usize; 5], cells: &[S; 5]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!("{:w$}", cell.as_ref()))
        .collect();
    format!("{}\n", padded.join("  ").trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(stack: &str, revision: &str, hash: &str) -> (String, StackMetadata) {
        (
            stack.to_string(),
            StackMetadata::new(
                revision,
                "9f8e7d6",
                hash,
                Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            ),
        )
    }

    #[test]
    fn table_aligns_columns_to_the_widest_cell() {
        let records = vec![
            record("web", "a1b2c3d", &"ab".repeat(32)),
            record("payments-api", "0f1e2d3", &"cd".repeat(32)),
        ];
        let table = render_table(&records);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("------------  --------  "));
        for (row, revision) in [(lines[0], "REVISION"), (lines[2], "a1b2c3d"), (lines[3], "0f1e2d3")] {
            assert_eq!(row.find(revision), Some(14), "misaligned: {row}");
        }
        assert!(lines[2].starts_with("web "));
        assert!(lines[2].ends_with("2024-05-01T12:30:00Z"));
    }

    #[test]
    fn table_shows_the_short_hash_only() {
        let full = "ab".repeat(32);
        let table = render_table(&[record("web", "a1b2c3d", &full)]);
        assert!(table.contains(swarmcd_core::ledger::short_hash(&full)));
        assert!(!table.contains(&full));
    }
}
