use std::{
    path::Path,
    process::{ Command, Output },
};
use modsweep::{ correction::AdjustmentTemplate, RawPoint, SecondaryParameters };

const FIXTURE: &str = r#"{
    "analyzer": { "fallback": "-20" },
    "meter": { "fallback": "0.0125" }
}"#;

const TWO_POINTS: &str = "
plo_min = -10.0
plo_max = -10.0
flo_min = 0.05
flo_max = 0.15
flo_delta = 0.1
";

fn modsweep(data_dir: &Path, args: &[&str]) -> Output
{
    Command::new(env!("CARGO_BIN_EXE_modsweep"))
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--simulate")
        .arg(data_dir.join("fixture.json"))
        .args(args)
        .output()
        .unwrap()
}

fn bench_dir(params: Option<&str>) -> tempfile::TempDir
{
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("fixture.json"), FIXTURE).unwrap();
    if let Some(params) = params {
        std::fs::write(dir.path().join("params.toml"), params).unwrap();
    }
    dir
}

#[test]
fn simulated_measure_captures_and_exports()
{
    let dir = bench_dir(Some(TWO_POINTS));
    let raw_out = dir.path().join("raw.json");

    let output = modsweep(dir.path(), &[
        "measure", "--profile", "+25", "--capture-template", "--raw-out", raw_out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("records written to"));

    let mut reader = csv::Reader::from_path(dir.path().join("table_+25.csv")).unwrap();
    assert_eq!(reader.records().count(), 2);

    let template = AdjustmentTemplate::load(&dir.path().join("adjust_+25.json")).unwrap().unwrap();
    assert_eq!(template.len(), 2);

    let raw: Vec<RawPoint> = serde_json::from_str(&std::fs::read_to_string(&raw_out).unwrap()).unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(raw[1].src_i, 0.0125);
}

#[test]
fn unknown_profile_exits_with_failure()
{
    let dir = bench_dir(Some(TWO_POINTS));

    let output = modsweep(dir.path(), &["measure", "--profile", "+40"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!dir.path().join("table_+40.csv").exists());
}

#[test]
fn first_run_writes_default_parameters()
{
    let dir = bench_dir(None);

    let output = modsweep(dir.path(), &["find"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("found"));

    let written = SecondaryParameters::load(&dir.path().join("params.toml")).unwrap();
    assert_eq!(written, SecondaryParameters::default());
}
