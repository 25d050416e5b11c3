use favhash::triage::{TriageRules, Verdict, expand_inputs, stream_rows, triage_file};
use futures::StreamExt;
use std::io::Write;
use tempfile::NamedTempFile;

fn csv_file(contents: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

const EXPORT: &str = "\
host,ip,port,title,domain,org
https://www.example.com,104.16.1.1,443,Example,example.com,CLOUDFLARENET
https://admin.example.com,198.51.100.10,443,Admin Panel,example.com,Hetzner Online GmbH
https://shop.example.com,192.0.2.44,443,Shop,example.com,GO-DADDY-COM-LLC
https://www.example.com,203.0.113.5,80,Example,example.com,OVH SAS
";

#[tokio::test]
async fn test_triage_export() {
    let file = csv_file(EXPORT.as_bytes());
    let report = triage_file(file.path(), &TriageRules::default(), false).await.unwrap();

    assert_eq!(report.total_rows, 4);
    assert_eq!(report.skipped_cdn, 1);
    let verdicts: Vec<(&str, Verdict)> = report
        .findings
        .iter()
        .map(|f| (f.row.ip.as_str(), f.verdict))
        .collect();
    assert_eq!(
        verdicts,
        vec![
            ("198.51.100.10", Verdict::CriticalAsset),
            ("192.0.2.44", Verdict::SharedHosting),
            ("203.0.113.5", Verdict::PotentialOrigin),
        ]
    );
}

#[tokio::test]
async fn test_all_cdn_yields_no_findings() {
    let file = csv_file(b"ip,org,title\n1.1.1.1,Cloudflare,Login\n2.2.2.2,Akamai Technologies,\n");
    let report = triage_file(file.path(), &TriageRules::default(), false).await.unwrap();
    assert_eq!(report.total_rows, 2);
    assert_eq!(report.skipped_cdn, 2);
    assert!(report.findings.is_empty());
}

#[tokio::test]
async fn test_missing_columns_and_short_rows() {
    let file = csv_file(b"\xef\xbb\xbfIP,Title\n10.0.0.1,Console\n10.0.0.2\n,Welcome\n");
    let rows: Vec<_> = stream_rows(file.path())
        .await
        .unwrap()
        .map(|row| row.unwrap())
        .collect()
        .await;

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].ip, "10.0.0.1");
    assert_eq!(rows[0].title, "Console");
    assert_eq!(rows[0].org, "");
    assert_eq!(rows[1].title, "");
    assert_eq!(rows[2].ip, "");
}

#[tokio::test]
async fn test_missing_ip_column_reads_as_na() {
    let file = csv_file(b"host,title\nhttps://a.example,Shop\n");
    let rows: Vec<_> = stream_rows(file.path())
        .await
        .unwrap()
        .map(|row| row.unwrap())
        .collect()
        .await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ip, "N/A");
}

#[tokio::test]
async fn test_rows_carry_physical_line_numbers() {
    let file = csv_file(b"ip,title\n10.0.0.1,\"Two\nline title\"\n10.0.0.2,Next\n");
    let rows: Vec<_> = stream_rows(file.path())
        .await
        .unwrap()
        .map(|row| row.unwrap())
        .collect()
        .await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].title, "Two\nline title");
    assert_eq!(rows[0].line, 2);
    assert_eq!(rows[1].line, 4);
}

#[tokio::test]
async fn test_show_cdn_lists_cdn_rows() {
    let file = csv_file(EXPORT.as_bytes());
    let report = triage_file(file.path(), &TriageRules::default(), true).await.unwrap();
    assert_eq!(report.skipped_cdn, 1);
    assert_eq!(report.findings.len(), 4);
    assert_eq!(report.findings[0].verdict, Verdict::Cdn);
    assert_eq!(report.candidates(), 3);
}

#[tokio::test]
async fn test_invalid_utf8_is_replaced() {
    let file = csv_file(b"ip,title,org\n10.0.0.9,Caf\xe9 portal,Leaseweb\n");
    let report = triage_file(file.path(), &TriageRules::default(), false).await.unwrap();
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].row.title, "Caf\u{fffd} portal");
    assert_eq!(report.findings[0].verdict, Verdict::PotentialOrigin);
}

#[tokio::test]
async fn test_missing_file_is_an_error() {
    let err = triage_file(
        std::path::Path::new("/definitely/not/here.csv"),
        &TriageRules::default(),
        false,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("failed to open"));
}

#[test]
fn test_expand_glob() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.csv", "b.csv", "notes.txt"] {
        std::fs::write(dir.path().join(name), "ip\n").unwrap();
    }
    let pattern = format!("{}/*.csv", dir.path().display());
    let paths = expand_inputs(&[pattern]).unwrap();
    let names: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["a.csv", "b.csv"]);
}
