//! Export functionality for similarity reports.
//!
//! Supports plain text for terminals, CSV of confirmed matches for
//! spreadsheets, and JSON of the whole report for other tools.

use super::SimilarityReport;
use crate::error::ReportError;
use std::io::Write;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Csv,
    Json,
}

impl ExportFormat {
    /// Write `report` to `writer` in this format
    pub fn write<W: Write>(self, report: &SimilarityReport, writer: W) -> Result<(), ReportError> {
        match self {
            ExportFormat::Text => export_text(report, writer),
            ExportFormat::Csv => export_csv(report, writer),
            ExportFormat::Json => export_json(report, writer),
        }
    }
}

/// Quote a CSV field when it contains a delimiter, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Export confirmed matches to CSV
///
/// CSV columns: Identity A, Identity B, Global Distance, Local Score
pub fn export_csv<W: Write>(report: &SimilarityReport, mut writer: W) -> Result<(), ReportError> {
    writeln!(writer, "identity_a,identity_b,global_distance,local_score")?;

    for result in &report.confirmed {
        writeln!(
            writer,
            "{},{},{},{}",
            csv_field(result.identity_a.as_str()),
            csv_field(result.identity_b.as_str()),
            result.global_distance,
            result.local_score.unwrap_or(0)
        )?;
    }

    Ok(())
}

/// Export the full report as pretty-printed JSON
pub fn export_json<W: Write>(report: &SimilarityReport, writer: W) -> Result<(), ReportError> {
    serde_json::to_writer_pretty(writer, report)
        .map_err(|e| ReportError::Serialization(e.to_string()))
}

/// Human-readable report: distance buckets, confirmed matches, summary
pub fn export_text<W: Write>(report: &SimilarityReport, mut writer: W) -> Result<(), ReportError> {
    writeln!(
        writer,
        "Similarity report ({})",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(writer)?;

    writeln!(writer, "Pairs by global distance")?;
    for bucket in &report.buckets {
        writeln!(writer, "  distance {:>3}: {} pairs", bucket.distance, bucket.count)?;
        for result in &bucket.results {
            let local = match result.local_score {
                Some(score) => format!("local score {}", score),
                None => "coarse only".to_string(),
            };
            let marker = if result.confirmed { " [confirmed]" } else { "" };
            writeln!(
                writer,
                "    {} <-> {} ({}){}",
                result.identity_a, result.identity_b, local, marker
            )?;
        }
    }
    writeln!(writer)?;

    writeln!(writer, "Confirmed matches")?;
    if report.confirmed.is_empty() {
        writeln!(writer, "  none")?;
    }
    for result in &report.confirmed {
        writeln!(
            writer,
            "  {} <-> {}  distance {}  score {}",
            result.identity_a,
            result.identity_b,
            result.global_distance,
            result.local_score.unwrap_or(0)
        )?;
    }
    writeln!(writer)?;

    if !report.skipped_pairs.is_empty() {
        writeln!(writer, "Skipped pairs")?;
        for skipped in &report.skipped_pairs {
            writeln!(
                writer,
                "  {} <-> {}: {}",
                skipped.identity_a, skipped.identity_b, skipped.reason
            )?;
        }
        writeln!(writer)?;
    }

    let summary = &report.summary;
    writeln!(writer, "Summary")?;
    writeln!(writer, "  records:          {}", summary.total_records)?;
    writeln!(writer, "  pairs evaluated:  {}", summary.pairs_evaluated)?;
    writeln!(writer, "  fine checks:      {}", summary.fine_checks)?;
    writeln!(writer, "  confirmed:        {}", summary.confirmed)?;
    writeln!(writer, "  skipped images:   {}", summary.skipped_images)?;
    writeln!(writer, "  skipped pairs:    {}", summary.skipped_pairs)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::MatchResult;
    use crate::core::reporter::ReportAggregator;

    fn report() -> SimilarityReport {
        let mut agg = ReportAggregator::new();
        agg.set_total_records(3);
        agg.push(MatchResult {
            identity_a: "card,1".into(),
            identity_b: "card-2".into(),
            global_distance: 1,
            local_score: Some(64),
            confirmed: true,
        });
        agg.push(MatchResult {
            identity_a: "card-2".into(),
            identity_b: "card-3".into(),
            global_distance: 29,
            local_score: None,
            confirmed: false,
        });
        agg.finish(1)
    }

    #[test]
    fn csv_lists_confirmed_only() {
        let mut buffer = Vec::new();
        export_csv(&report(), &mut buffer).unwrap();
        let csv = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "identity_a,identity_b,global_distance,local_score");
        assert_eq!(lines[1], "\"card,1\",card-2,1,64");
    }

    #[test]
    fn json_round_trips_summary() {
        let mut buffer = Vec::new();
        ExportFormat::Json.write(&report(), &mut buffer).unwrap();

        let parsed: SimilarityReport = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed.summary.total_records, 3);
        assert_eq!(parsed.summary.skipped_images, 1);
        assert_eq!(parsed.confirmed.len(), 1);
    }

    #[test]
    fn text_has_every_section() {
        let mut buffer = Vec::new();
        export_text(&report(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("Pairs by global distance"));
        assert!(text.contains("distance   1: 1 pairs"));
        assert!(text.contains("Confirmed matches"));
        assert!(text.contains("card,1 <-> card-2  distance 1  score 64"));
        assert!(text.contains("skipped images:   1"));
    }
}
