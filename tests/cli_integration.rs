#![cfg(feature = "cli")]

use std::path::Path;
use std::process::Command;

use garmin_dem::dem::DemReader;
use garmin_dem::io::load_hgt;
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_garmin-dem").to_string()
}

fn write_hgt(path: &Path, edge: usize) {
    let mut out = Vec::with_capacity(edge * edge * 2);
    for r in 0..edge {
        for c in 0..edge {
            let h: i16 = if (r, c) == (10, 10) {
                -32768
            } else {
                ((r * 31 + c * 7) % 900) as i16 - 20
            };
            out.extend_from_slice(&h.to_be_bytes());
        }
    }
    std::fs::write(path, out).unwrap();
}

#[test]
fn cli_encode_then_inspect() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("N46E007.hgt");
    let output = dir.path().join("out.dem");
    write_hgt(&input, 101);

    let st = Command::new(bin())
        .arg("encode")
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());

    let bytes = std::fs::read(&output).unwrap();
    let reader = DemReader::parse(&bytes).unwrap();
    assert_eq!(reader.sections().len(), 1);
    assert_eq!(
        reader.decode_section(0).unwrap(),
        load_hgt(&input).unwrap().grid
    );

    let out = Command::new(bin())
        .args(["inspect", "--tiles", "--verify"])
        .arg(&output)
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("Section 0:"));
    assert!(text.contains("Decoded grid:           101 x 101"));
}

#[test]
fn cli_refuses_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("N00E000.hgt");
    let output = dir.path().join("out.dem");
    write_hgt(&input, 65);
    std::fs::write(&output, b"keep").unwrap();

    let st = Command::new(bin())
        .arg("encode")
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(!st.success());
    assert_eq!(std::fs::read(&output).unwrap(), b"keep");

    let st = Command::new(bin())
        .args(["--force", "encode", "--native", "--distance", "400000"])
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    let bytes = std::fs::read(&output).unwrap();
    let reader = DemReader::parse(&bytes).unwrap();
    assert_eq!(reader.sections().len(), 2);
    assert_eq!(reader.sections()[1].points_distance_lat, 400_000);
    assert_eq!(reader.decode_section(1).unwrap().width(), 30);
}

#[test]
fn cli_json_stats() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("S01W001.hgt");
    let output = dir.path().join("out.dem");
    write_hgt(&input, 65);

    let out = Command::new(bin())
        .arg("--json")
        .arg("encode")
        .arg(&input)
        .arg(&output)
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["command"], "encode");
    assert_eq!(json["sections"], 1);
    assert_eq!(
        json["output_size"].as_u64().unwrap(),
        std::fs::metadata(&output).unwrap().len()
    );

    let out = Command::new(bin())
        .args(["--json", "inspect"])
        .arg(&output)
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["sections"][0]["tiles_lat"], 1);
    assert_eq!(json["sections"][0]["non_std_width"], 65);
}

#[test]
fn cli_rejects_bad_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.hgt");
    std::fs::write(&input, [0u8; 11]).unwrap();

    let st = Command::new(bin())
        .arg("encode")
        .arg(&input)
        .arg(dir.path().join("out.dem"))
        .status()
        .unwrap();
    assert!(!st.success());

    let st = Command::new(bin())
        .arg("inspect")
        .arg(&input)
        .status()
        .unwrap();
    assert!(!st.success());
}

#[test]
fn cli_config_succeeds() {
    let st = Command::new(bin()).arg("config").status().unwrap();
    assert!(st.success());
}
