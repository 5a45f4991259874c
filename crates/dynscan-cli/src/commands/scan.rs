//! Scan command implementation.

use super::Session;
use anyhow::Result;
use clap::ValueEnum;
use dynscan_core::{BoxError, Config};
use serde::Serialize;
use std::io::{self, BufWriter, Write};
use tracing::info;

/// Delivery mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Collect every item, then print them
    Collect,
    /// Print each item as it is read
    Each,
    /// Print one JSON array per batch
    Batch,
}

/// Run a scan and write the results to stdout as JSON lines.
pub fn run(config: Config, mode: Mode, pretty: bool, metrics: bool) -> Result<()> {
    let session = Session::connect(config)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let report = match mode {
        Mode::Collect => {
            let output = session.scan().run()?;
            for item in output.items.iter().flatten() {
                write_json(&mut out, item, pretty).map_err(|e| anyhow::anyhow!(e))?;
            }
            output.report
        }
        Mode::Each => session
            .scan()
            .for_each(|item| write_json(&mut out, &item, pretty))?,
        Mode::Batch => session
            .scan()
            .for_each_batch(|batch| write_json(&mut out, &batch, pretty))?,
    };
    out.flush()?;

    info!(
        table = %report.table,
        strategy = %report.strategy,
        items = report.metrics.items_accepted,
        dropped = report.metrics.items_dropped,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Scan finished"
    );

    if metrics {
        eprint!("{}", session.metrics().export_prometheus_text());
    }
    Ok(())
}

/// Write `value` followed by a newline.
fn write_json<W: Write, T: Serialize>(
    out: &mut W,
    value: &T,
    pretty: bool,
) -> std::result::Result<(), BoxError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_json_lines() {
        let mut out = Vec::new();
        write_json(&mut out, &json!({"id": "a"}), false).unwrap();
        write_json(&mut out, &vec![json!(1), json!(2)], false).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "{\"id\":\"a\"}\n[1,2]\n");
    }

    #[test]
    fn test_write_json_pretty() {
        let mut out = Vec::new();
        write_json(&mut out, &json!({"id": "a"}), true).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "{\n  \"id\": \"a\"\n}\n");
    }
}
