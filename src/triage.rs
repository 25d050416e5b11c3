//! Triage of exported scan results (FOFA-style CSV).
//!
//! Rows announced by a CDN are noise; everything else is a candidate origin
//! server, promoted to a critical asset when its title, host or domain looks
//! like an admin or internal surface.

use anyhow::{Context, Result, anyhow};
use async_stream::stream;
use csv_async::{AsyncReaderBuilder, ByteRecord};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub const CDN_NETWORKS: &[&str] = &[
    "CLOUDFLARE",
    "AKAMAI",
    "FASTLY",
    "AMAZON",
    "GOOGLE",
    "MICROSOFT",
    "ALICLOUD",
    "CDNETWORKS",
    "INCAPSULA",
    "SUCURI",
];

pub const INTERESTING_KEYWORDS: &[&str] = &[
    "admin",
    "login",
    "system",
    "dashboard",
    "dev",
    "staging",
    "test",
    "prod",
    "internal",
    "config",
    "management",
    "vpn",
    "git",
    "gray",
    "back",
    "backend",
    "api",
    "console",
    "管理",
    "后台",
    "系统",
];

pub const SHARED_HOSTING: &[&str] = &["GO-DADDY", "NAMECHEAP"];

/// Keyword lists used to classify rows.
#[derive(Debug, Clone)]
pub struct TriageRules {
    /// Upper-cased organisation substrings of CDN providers.
    pub cdn_networks: Vec<String>,
    /// Lower-cased substrings that mark interesting titles or hosts.
    pub keywords: Vec<String>,
    /// Upper-cased organisation substrings of shared hosting providers.
    pub shared_hosting: Vec<String>,
}

impl Default for TriageRules {
    fn default() -> Self {
        Self {
            cdn_networks: CDN_NETWORKS.iter().map(|s| s.to_string()).collect(),
            keywords: INTERESTING_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            shared_hosting: SHARED_HOSTING.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TriageRules {
    /// Adds user-supplied entries on top of the current lists.
    pub fn extend(
        mut self,
        cdn_networks: &[String],
        keywords: &[String],
        shared_hosting: &[String],
    ) -> Self {
        self.cdn_networks
            .extend(cdn_networks.iter().map(|s| s.to_uppercase()));
        self.keywords.extend(keywords.iter().map(|s| s.to_lowercase()));
        self.shared_hosting
            .extend(shared_hosting.iter().map(|s| s.to_uppercase()));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanRow {
    pub ip: String,
    pub org: String,
    pub title: String,
    pub domain: String,
    pub host: String,
    /// Physical line the record starts on.
    #[serde(skip)]
    pub line: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Cdn,
    CriticalAsset,
    SharedHosting,
    PotentialOrigin,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Cdn => "CDN",
            Verdict::CriticalAsset => "CRITICAL ASSET",
            Verdict::SharedHosting => "Shared Hosting",
            Verdict::PotentialOrigin => "POTENTIAL ORIGIN",
        })
    }
}

pub fn classify(row: &ScanRow, rules: &TriageRules) -> Verdict {
    let org = row.org.to_uppercase();
    if rules.cdn_networks.iter().any(|cdn| org.contains(cdn.as_str())) {
        return Verdict::Cdn;
    }

    let fields = [
        row.title.to_lowercase(),
        row.host.to_lowercase(),
        row.domain.to_lowercase(),
    ];
    let interesting = rules.keywords.iter().any(|kw| {
        let kw = kw.to_lowercase();
        fields.iter().any(|field| field.contains(&kw))
    });
    if interesting {
        return Verdict::CriticalAsset;
    }

    if rules
        .shared_hosting
        .iter()
        .any(|provider| org.contains(provider.as_str()))
    {
        return Verdict::SharedHosting;
    }

    Verdict::PotentialOrigin
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    #[serde(flatten)]
    pub row: ScanRow,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriageReport {
    pub source: PathBuf,
    pub total_rows: usize,
    pub skipped_cdn: usize,
    pub findings: Vec<Finding>,
}

impl TriageReport {
    /// Findings that are not CDN noise.
    pub fn candidates(&self) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.verdict != Verdict::Cdn)
            .count()
    }
}

pub type RowStream = Pin<Box<dyn Stream<Item = Result<ScanRow>> + Send>>;

/// Streams rows of a scan export. Missing columns read as empty strings (a
/// missing `ip` column reads as `N/A`) and invalid UTF-8 is replaced rather
/// than rejected.
pub async fn stream_rows(path: &Path) -> Result<RowStream> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut csv_reader = AsyncReaderBuilder::new()
        .flexible(true)
        .create_reader(file);

    let headers = csv_reader
        .byte_headers()
        .await
        .with_context(|| format!("failed to read CSV headers of {}", path.display()))?
        .clone();
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let name = String::from_utf8_lossy(h);
            (name.trim_start_matches('\u{feff}').trim().to_lowercase(), i)
        })
        .collect();
    tracing::debug!("Columns of {}: {:?}", path.display(), columns);

    let has_ip = columns.contains_key("ip");
    let column = move |record: &ByteRecord, name: &str| -> String {
        columns
            .get(name)
            .and_then(|&idx| record.get(idx))
            .map(|value| String::from_utf8_lossy(value).into_owned())
            .unwrap_or_default()
    };

    let source = path.display().to_string();
    let stream = stream! {
        let mut records = csv_reader.into_byte_records();
        while let Some(result) = records.next().await {
            match result {
                Ok(record) => {
                    yield Ok(ScanRow {
                        ip: if has_ip { column(&record, "ip") } else { "N/A".to_string() },
                        org: column(&record, "org"),
                        title: column(&record, "title"),
                        domain: column(&record, "domain"),
                        host: column(&record, "host"),
                        line: record.position().map_or(0, |pos| pos.line()),
                    });
                }
                Err(e) => match e.position() {
                    Some(pos) => {
                        yield Err(anyhow!("{}: bad record at line {}: {}", source, pos.line(), e));
                    }
                    None => {
                        yield Err(anyhow!("{}: bad record: {}", source, e));
                    }
                },
            }
        }
    };
    Ok(Box::pin(stream))
}

/// Classifies every row of `path`. CDN rows are always counted and are only
/// listed as findings when `show_cdn` is set.
pub async fn triage_file(
    path: &Path,
    rules: &TriageRules,
    show_cdn: bool,
) -> Result<TriageReport> {
    tracing::info!("Analyzing {}", path.display());
    let mut rows = stream_rows(path).await?;

    let mut report = TriageReport {
        source: path.to_path_buf(),
        total_rows: 0,
        skipped_cdn: 0,
        findings: Vec::new(),
    };
    while let Some(row) = rows.next().await {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Skipping row: {}", e);
                continue;
            }
        };
        report.total_rows += 1;
        match classify(&row, rules) {
            Verdict::Cdn => {
                report.skipped_cdn += 1;
                if show_cdn {
                    report.findings.push(Finding {
                        row,
                        verdict: Verdict::Cdn,
                    });
                }
            }
            verdict => report.findings.push(Finding { row, verdict }),
        }
    }

    tracing::info!(
        "{}: {} rows, {} behind CDN, {} candidates",
        path.display(),
        report.total_rows,
        report.skipped_cdn,
        report.candidates()
    );
    Ok(report)
}

/// Expands glob patterns into file paths. A pattern without matches is kept
/// verbatim so that opening it reports a useful error.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matches: Vec<PathBuf> = glob::glob(pattern)
            .with_context(|| format!("invalid input pattern '{}'", pattern))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!("Unreadable path for '{}': {}", pattern, e);
                    None
                }
            })
            .collect();
        if matches.is_empty() {
            paths.push(PathBuf::from(pattern));
        } else {
            paths.extend(matches);
        }
    }
    Ok(paths)
}
