//! Runs the `tour-query` binary against a small data file

use std::path::PathBuf;
use std::process::{Command, Output};

const TOURS: &str = r#"[
  {"_id": "a", "name": "The Park Camper", "duration": 10, "maxGroupSize": 15,
   "difficulty": "medium", "ratingsAverage": 4.9, "ratingsQuantity": 19, "price": 1497,
   "startLocation": {"type": "Point", "coordinates": [-118.076152, 34.113596]},
   "startDates": ["2021-08-05,10:00", "2022-03-20,10:00"]},
  {"_id": "b", "name": "The Sea Explorer", "duration": 7, "maxGroupSize": 15,
   "difficulty": "medium", "ratingsAverage": 4.8, "ratingsQuantity": 23, "price": 497,
   "startLocation": {"type": "Point", "coordinates": [-80.185942, 25.774772]},
   "startDates": ["2021-06-19,10:00", "2021-08-18,10:00"]}
]"#;

fn data_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tour-query-bin-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("tours.json");
    std::fs::write(&path, TOURS).unwrap();
    path
}

fn run(name: &str, args: &[&str]) -> Output {
    let data = data_file(name);
    Command::new(env!("CARGO_BIN_EXE_tour-query"))
        .arg("--data")
        .arg(&data)
        .args(args)
        .env_remove("TOURS_DATA")
        .env("RUST_LOG", "off")
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_within_prints_matching_tours() {
    let output = run("within", &["within", "50", "34.111745,-118.113491", "km"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["name"], "The Park Camper");
}

#[test]
fn test_distances_ranked() {
    let output = run("distances", &["distances", "25.77,-80.18", "mi"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json[0]["_id"], "b");
    assert_eq!(json[1]["_id"], "a");
}

#[test]
fn test_plan() {
    let output = run("plan", &["plan", "2021"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json[0]["month"], 8);
    assert_eq!(json[0]["numTourStart"], 2);
}

#[test]
fn test_validation_error_exit_code() {
    let output = run("invalid", &["within", "10", "34.1", "mi"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Please provide a longitude"), "{stderr}");
}

#[test]
fn test_not_found_exit_code() {
    let output = run("missing", &["get", "nope"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_max_page_size_clamps_listing() {
    let output = run("pagesize", &["--max-page-size", "1", "list", "--limit", "5"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json.as_array().unwrap().len(), 1);
}
