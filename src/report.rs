//! Rendering of results for the terminal or for machines.
//!
//! Nothing here computes anything; the fingerprint and triage modules hand
//! over finished values.

use crate::fingerprint::Fingerprint;
use crate::query::SearchEngine;
use crate::triage::{TriageReport, Verdict};
use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;

const RULE_WIDTH: usize = 40;
const TABLE_WIDTH: usize = 100;
const TITLE_WIDTH: usize = 35;
const ORG_WIDTH: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct Query {
    engine: SearchEngine,
    query: String,
}

#[derive(Serialize)]
struct FingerprintView<'a> {
    #[serde(flatten)]
    fingerprint: &'a Fingerprint,
    queries: Vec<Query>,
}

pub fn render_fingerprint(
    fingerprint: &Fingerprint,
    engines: &[SearchEngine],
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let view = FingerprintView {
                fingerprint,
                queries: engines
                    .iter()
                    .map(|engine| Query {
                        engine: *engine,
                        query: engine.query(fingerprint.hash),
                    })
                    .collect(),
            };
            Ok(serde_json::to_string_pretty(&view)?)
        }
        OutputFormat::Text => Ok(fingerprint_text(fingerprint, engines)?),
    }
}

fn field(label: &str) -> String {
    format!("{:<14}", format!("{}:", label))
}

fn fingerprint_text(
    fingerprint: &Fingerprint,
    engines: &[SearchEngine],
) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "{}", rule)?;
    writeln!(out, "{}", "[SUCCESS] Hash Calculated!".green())?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "{}{}", field("Target"), fingerprint.source)?;
    writeln!(out, "{}{} bytes", field("File Size"), fingerprint.size)?;
    if let Some(format) = &fingerprint.format {
        writeln!(out, "{}{}", field("Format"), format)?;
    }
    writeln!(
        out,
        "{}{}",
        field("MurmurHash3"),
        fingerprint.hash.to_string().bold()
    )?;
    if !engines.is_empty() {
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(out, "{}", "Search Queries:".magenta())?;
        for engine in engines {
            writeln!(
                out,
                "{}{}",
                field(engine.label()),
                engine.query(fingerprint.hash)
            )?;
        }
    }
    write!(out, "{}", rule)?;
    Ok(out)
}

/// Shortens a title for the table, counting characters rather than bytes.
pub fn display_name(title: &str, host: &str) -> String {
    if title.is_empty() {
        return host.to_string();
    }
    if title.chars().count() > TITLE_WIDTH {
        let short: String = title.chars().take(TITLE_WIDTH).collect();
        format!("{}...", short)
    } else {
        title.to_string()
    }
}

fn colored_verdict(verdict: Verdict) -> String {
    let label = verdict.to_string();
    match verdict {
        Verdict::CriticalAsset => label.red().bold().to_string(),
        Verdict::SharedHosting => label.yellow().to_string(),
        Verdict::PotentialOrigin => label.green().to_string(),
        Verdict::Cdn => label.dimmed().to_string(),
    }
}

pub fn render_triage(reports: &[TriageReport], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(reports)?),
        OutputFormat::Text => {
            let mut out = String::new();
            for report in reports {
                triage_text(&mut out, report)?;
            }
            Ok(out.trim_end().to_string())
        }
    }
}

fn triage_text(out: &mut String, report: &TriageReport) -> std::fmt::Result {
    writeln!(
        out,
        "{}",
        format!("[*] Analyzing {}...", report.source.display()).blue()
    )?;
    writeln!(
        out,
        "{:<20} | {:<25} | {:<40} | {}",
        "IP Address", "Org", "Title/Domain", "Verdict"
    )?;
    writeln!(out, "{}", "-".repeat(TABLE_WIDTH))?;

    for finding in &report.findings {
        let row = &finding.row;
        let org: String = row.org.to_uppercase().chars().take(ORG_WIDTH).collect();
        writeln!(
            out,
            "{:<20} | {:<25} | {:<40} | {}",
            row.ip,
            org,
            display_name(&row.title, &row.host),
            colored_verdict(finding.verdict)
        )?;
    }

    let candidates = report.candidates();
    if candidates == 0 {
        writeln!(
            out,
            "{}",
            "[!] No obvious origin IPs found. Target might be fully behind CDN.".yellow()
        )?;
    } else {
        writeln!(out, "{}", "-".repeat(TABLE_WIDTH))?;
        writeln!(
            out,
            "{}",
            format!(
                "[*] Analysis Complete. Found {} potential origin candidates ({} CDN rows skipped).",
                candidates,
                report.skipped_cdn
            )
            .blue()
        )?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Source;
    use crate::triage::{Finding, ScanRow};
    use std::path::PathBuf;

    fn plain() {
        colored::control::set_override(false);
    }

    fn fingerprint() -> Fingerprint {
        Fingerprint::compute(
            Source::Url("https://example.com/favicon.ico".to_string()),
            b"a",
        )
    }

    #[test]
    fn test_display_name_truncates_by_chars() {
        assert_eq!(display_name("", "host.example"), "host.example");
        assert_eq!(display_name("Short", "host"), "Short");
        let long = "后".repeat(40);
        let shown = display_name(&long, "");
        assert_eq!(shown.chars().count(), TITLE_WIDTH + 3);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_fingerprint_text() {
        plain();
        let text =
            render_fingerprint(&fingerprint(), &SearchEngine::ALL, OutputFormat::Text).unwrap();
        assert!(text.contains("Target:       https://example.com/favicon.ico"));
        assert!(text.contains("File Size:    1 bytes"));
        assert!(text.contains("MurmurHash3:  -316242180"));
        assert!(text.contains("Shodan:       http.favicon.hash:-316242180"));
        assert!(text.contains("ZoomEye:      iconhash:\"-316242180\""));
        assert!(text.contains("FOFA:         icon_hash=\"-316242180\""));
    }

    #[test]
    fn test_fingerprint_json() {
        let json =
            render_fingerprint(&fingerprint(), &[SearchEngine::Shodan], OutputFormat::Json)
                .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["hash"], -316242180);
        assert_eq!(value["size"], 1);
        assert_eq!(value["source"]["kind"], "url");
        assert_eq!(value["source"]["location"], "https://example.com/favicon.ico");
        assert_eq!(value["queries"][0]["engine"], "shodan");
        assert_eq!(value["queries"][0]["query"], "http.favicon.hash:-316242180");
    }

    fn report(findings: Vec<Finding>) -> TriageReport {
        TriageReport {
            source: PathBuf::from("scan.csv"),
            total_rows: findings.len() + 2,
            skipped_cdn: 2,
            findings,
        }
    }

    #[test]
    fn test_triage_text() {
        plain();
        let finding = Finding {
            row: ScanRow {
                ip: "203.0.113.7".to_string(),
                org: "ovh sas".to_string(),
                title: "Admin".to_string(),
                ..Default::default()
            },
            verdict: Verdict::CriticalAsset,
        };
        let text = render_triage(&[report(vec![finding])], OutputFormat::Text).unwrap();
        let line = text
            .lines()
            .find(|line| line.starts_with("203.0.113.7"))
            .unwrap();
        assert_eq!(
            line,
            format!("{:<20} | {:<25} | {:<40} | CRITICAL ASSET", "203.0.113.7", "OVH SAS", "Admin")
        );
        assert!(text.contains("Found 1 potential origin candidates"));
    }

    #[test]
    fn test_triage_text_without_findings() {
        plain();
        let text = render_triage(&[report(Vec::new())], OutputFormat::Text).unwrap();
        assert!(text.contains("Target might be fully behind CDN"));
    }

    #[test]
    fn test_cdn_rows_are_listed_but_not_counted() {
        plain();
        let finding = Finding {
            row: ScanRow {
                ip: "104.16.1.1".to_string(),
                org: "Cloudflare".to_string(),
                host: "www.example.com".to_string(),
                ..Default::default()
            },
            verdict: Verdict::Cdn,
        };
        let text = render_triage(&[report(vec![finding])], OutputFormat::Text).unwrap();
        let line = text
            .lines()
            .find(|line| line.starts_with("104.16.1.1"))
            .unwrap();
        assert!(line.ends_with("| CDN"));
        assert!(line.contains("www.example.com"));
        assert!(text.contains("Target might be fully behind CDN"));
    }

    #[test]
    fn test_triage_text_for_several_files() {
        plain();
        let mut second = report(Vec::new());
        second.source = PathBuf::from("other.csv");
        let text = render_triage(&[report(Vec::new()), second], OutputFormat::Text).unwrap();
        assert!(text.contains("[*] Analyzing scan.csv..."));
        assert!(text.contains("[*] Analyzing other.csv..."));
        assert_eq!(text.matches("IP Address").count(), 2);
    }

    #[test]
    fn test_triage_json() {
        let json = render_triage(&[report(Vec::new())], OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["skipped_cdn"], 2);
        assert_eq!(value[0]["source"], "scan.csv");
        assert!(value.is_array());
    }
}
