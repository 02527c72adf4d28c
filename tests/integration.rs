use anyhow::Result;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const INPUT: &str = "tests/data/three_variants.vcf";

/// Variant whose lookup never answers within the client timeout
const SLOW_KEY: &str = "1-1254838-CTTTC-ATTTA,CTTTA";

const MISSENSE: &str = r#"{
    "variant_id": "1-931393-G-T",
    "rsid": ".",
    "allele_freq": 0.0123,
    "vep_annotations": [
        {"Consequence": "missense_variant&splice_region_variant", "major_consequence": "missense_variant", "BIOTYPE": "protein_coding", "SYMBOL": "HES4"},
        {"Consequence": "downstream_gene_variant", "major_consequence": "downstream_gene_variant", "BIOTYPE": "processed_transcript", "SYMBOL": "HES4"}
    ]
}"#;

const NO_VERSIONS: &str = r#"{"allele_freq": 0.0456, "vep_annotations": []}"#;

fn respond(mut stream: TcpStream) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    // drain the remaining request headers
    let mut line = String::new();
    while reader.read_line(&mut line).map(|n| n > 2).unwrap_or(false) {
        line.clear();
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("");
    let (status, body) = if path.ends_with("/1-931393-G-T") {
        ("200 OK", MISSENSE)
    } else if path.ends_with("/22-46615880-T-C") {
        ("200 OK", NO_VERSIONS)
    } else if path.contains("1-1254838") {
        thread::sleep(Duration::from_secs(3));
        ("200 OK", NO_VERSIONS)
    } else {
        ("404 Not Found", "{}")
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    // the client may already have given up on slow requests
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

/// Start a stub variant endpoint and return its base URL
fn spawn_stub_service() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || respond(stream));
        }
    });
    Ok(format!("http://{}/rest/variant/variant", addr))
}

/// Base URL on a port nothing listens on
fn unreachable_service() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}/rest/variant/variant", addr))
}

fn body_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect())
}

#[test]
fn test_annotate_with_one_timeout() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let prefix = temp_dir.path().join("sample");
    let base_url = spawn_stub_service()?;

    let mut cmd = Command::cargo_bin("exanno")?;
    cmd.arg("annotate")
        .arg("-i")
        .arg(INPUT)
        .arg("-p")
        .arg(&prefix)
        .arg("--base-url")
        .arg(&base_url)
        .arg("--timeout")
        .arg("1")
        .arg("-v")
        .env("RUST_LOG", "info")
        .assert()
        .success()
        .stderr(predicate::str::contains("annotation unavailable"))
        .stderr(predicate::str::contains(SLOW_KEY))
        .stderr(predicate::str::contains("Stage: done"));

    let output = temp_dir.path().join("sample_annotated.vcf");
    let text = std::fs::read_to_string(&output)?;

    let input_header: Vec<String> = std::fs::read_to_string(INPUT)?
        .lines()
        .take_while(|l| l.starts_with("##"))
        .map(str::to_string)
        .collect();
    let output_header: Vec<&str> = text.lines().take_while(|l| l.starts_with("##")).collect();
    assert_eq!(output_header.len(), input_header.len() + 5);
    assert_eq!(&output_header[..input_header.len()], &input_header[..]);
    for id in ["ExAC_AF", "CSQ", "Major_CSQ", "BIOTYPE", "PSV"] {
        assert_eq!(
            text.matches(&format!("##INFO=<ID={},", id)).count(),
            1,
            "declaration of {}",
            id
        );
    }

    let rows = body_rows(&output)?;
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0][2], "1-931393-G-T");
    assert_eq!(
        rows[0][7],
        "DP=4124;AO=95;RO=4029;TYPE=snp;ExAC_AF=0.012;\
CSQ=downstream_gene_variant,missense_variant,splice_region_variant;\
Major_CSQ=missense_variant;BIOTYPE=processed_transcript,protein_coding;PSV=2.3"
    );

    assert_eq!(rows[1][2], SLOW_KEY);
    assert_eq!(
        rows[1][7],
        "DP=40;AO=5,5;RO=30;TYPE=complex,snp;ExAC_AF=.;CSQ=.;Major_CSQ=.;BIOTYPE=.;PSV=25.0"
    );

    assert_eq!(
        rows[2][7],
        "DP=40;AO=40;RO=0;TYPE=snp;ExAC_AF=0.046;CSQ=.;Major_CSQ=.;BIOTYPE=.;PSV=100.0"
    );
    // sample columns pass through untouched
    assert_eq!(rows[2][8..], ["GT:DP", "1/1:20", "1/1:20"]);

    Ok(())
}

#[test]
fn test_annotate_aborts_when_service_unreachable() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let prefix = temp_dir.path().join("sample");
    let base_url = unreachable_service()?;

    let mut cmd = Command::cargo_bin("exanno")?;
    cmd.arg("annotate")
        .arg("-i")
        .arg(INPUT)
        .arg("-p")
        .arg(&prefix)
        .arg("--base-url")
        .arg(&base_url)
        .arg("--max-failures")
        .arg("2")
        .arg("-t")
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("annotation service unavailable"))
        .stderr(predicate::str::contains(INPUT))
        .stderr(predicate::str::contains("sample_annotated.vcf not written"));

    assert!(!temp_dir.path().join("sample_annotated.vcf").exists());
    assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 0);

    Ok(())
}

#[test]
fn test_annotate_missing_support_abort() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let prefix = temp_dir.path().join("sample");
    let base_url = spawn_stub_service()?;

    let mut cmd = Command::cargo_bin("exanno")?;
    cmd.arg("annotate")
        .arg("-i")
        .arg(INPUT)
        .arg("-p")
        .arg(&prefix)
        .arg("--base-url")
        .arg(&base_url)
        .arg("--timeout")
        .arg("1")
        .arg("--alt-key")
        .arg("SAF")
        .arg("--missing-support")
        .arg("abort")
        .assert()
        .failure()
        .stderr(predicate::str::contains("INFO has no 'SAF' value"));

    assert!(!temp_dir.path().join("sample_annotated.vcf").exists());

    Ok(())
}

#[test]
fn test_annotate_missing_input() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let mut cmd = Command::cargo_bin("exanno")?;
    cmd.arg("annotate")
        .arg("-i")
        .arg(temp_dir.path().join("missing.vcf"))
        .arg("-p")
        .arg(temp_dir.path().join("sample"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.vcf"));

    Ok(())
}

#[test]
fn test_inspect() -> Result<()> {
    let mut cmd = Command::cargo_bin("exanno")?;
    cmd.arg("inspect")
        .arg(INPUT)
        .assert()
        .success()
        .stdout(predicate::str::contains("Header lines: 9"))
        .stdout(predicate::str::contains("Variants: 3"))
        .stdout(predicate::str::contains("Samples (2): NORMAL, VAF5"))
        .stdout(predicate::str::contains("INFO fields (4):"))
        .stdout(predicate::str::contains("FORMAT fields (2):"));

    Ok(())
}

#[test]
fn test_inspect_verbose_lists_metadata() -> Result<()> {
    let mut cmd = Command::cargo_bin("exanno")?;
    cmd.arg("inspect")
        .arg(INPUT)
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains("Other metadata (3):"))
        .stdout(predicate::str::contains("  ##source=freeBayes v1.0.2-29-g41c1313"));

    Ok(())
}

#[test]
fn test_inspect_rejects_threads() -> Result<()> {
    let mut cmd = Command::cargo_bin("exanno")?;
    cmd.arg("inspect")
        .arg(INPUT)
        .arg("--threads")
        .arg("2")
        .assert()
        .failure();

    Ok(())
}
