#[path = "../common/mod.rs"]
mod common;

use common::{assert_success, dacprep, list_names, write_sheet, write_tone};
use dacprep::audio::io::WavIo;
use dacprep::dataset::Sheet;
use std::fs;

#[test]
fn cli_rename_strips_decorations() {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in [
        "Zelda--param1-00.50_3 (copy).dac",
        "Zelda--param1-01.00.dac",
        "Link--param1-00.25_1.dac",
        "notes.txt",
    ] {
        fs::write(dir.path().join(name), name).expect("write");
    }

    assert_success(&dacprep(&["rename", dir.path().to_str().unwrap()]));
    assert_eq!(
        list_names(dir.path()),
        vec![
            "Link--param1-00.25_1.dac",
            "Zelda--param1-00.50.dac",
            "Zelda--param1-01.00.dac",
            "notes.txt",
        ]
    );

    assert_success(&dacprep(&["rename", dir.path().to_str().unwrap(), "--any-class"]));
    assert!(dir.path().join("Link--param1-00.25.dac").is_file());
}

#[test]
fn cli_flatten_collapses_dac_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let single = dir.path().join("Zelda--param1-00.10.dac");
    fs::create_dir(&single).expect("mkdir");
    fs::write(single.join("codes"), "single").expect("write");
    let multi = dir.path().join("batch.dac");
    fs::create_dir(&multi).expect("mkdir");
    fs::write(multi.join("a.dac"), "a").expect("write");
    fs::write(multi.join("b.dac"), "b").expect("write");

    assert_success(&dacprep(&["flatten", "--target_dir", dir.path().to_str().unwrap()]));
    assert_eq!(
        list_names(dir.path()),
        vec!["Zelda--param1-00.10.dac", "batch--a.dac", "batch--b.dac"]
    );
    assert!(single.is_file());
}

#[test]
fn cli_split_then_reorganize() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = dir.path().join("raw");
    fs::create_dir(&raw).expect("mkdir");

    let mut rows = Vec::new();
    let names: Vec<String> = (0..10)
        .flat_map(|i| [format!("Zelda--param1-{i}.dac"), format!("Link--param1-{i}.dac")])
        .collect();
    for name in &names {
        fs::write(raw.join(name), name).expect("write");
        let class = if name.starts_with("Zelda") { "Zelda" } else { "Link" };
        rows.push(vec![name.as_str(), class]);
    }
    let labels = dir.path().join("labels.xlsx");
    write_sheet(&labels, &["Full File Name", "Class Name"], &rows);

    let sheets = dir.path().join("sheets");
    assert_success(&dacprep(&[
        "split",
        labels.to_str().unwrap(),
        "--output-dir",
        sheets.to_str().unwrap(),
        "--samples",
        "5",
        "--train-ratio",
        "0.6",
    ]));
    let train = Sheet::read(sheets.join("dac-train.xlsx")).expect("train sheet");
    let val = Sheet::read(sheets.join("dac-val.xlsx")).expect("val sheet");
    assert_eq!(train.rows.len(), 6);
    assert_eq!(val.rows.len(), 4);
    assert_eq!(train.headers, vec!["Full File Name", "Class Name"]);

    let train_dir = dir.path().join("train");
    let val_dir = dir.path().join("val");
    assert_success(&dacprep(&[
        "reorganize",
        "--train-excel",
        sheets.join("dac-train.xlsx").to_str().unwrap(),
        "--val-excel",
        sheets.join("dac-val.xlsx").to_str().unwrap(),
        "--source-dir",
        raw.to_str().unwrap(),
        "--train-dir",
        train_dir.to_str().unwrap(),
        "--val-dir",
        val_dir.to_str().unwrap(),
        "--move",
    ]));
    assert_eq!(list_names(&train_dir).len(), 6);
    assert_eq!(list_names(&val_dir).len(), 4);
    assert_eq!(list_names(&raw).len(), 10);
    for name in list_names(&train_dir) {
        assert!(!val_dir.join(&name).exists());
    }
}

#[test]
fn cli_split_is_reproducible() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rows: Vec<Vec<String>> = (0..30)
        .map(|i| vec![format!("f{i}.dac"), "Zelda".to_string()])
        .collect();
    let rows: Vec<Vec<&str>> = rows
        .iter()
        .map(|row| row.iter().map(String::as_str).collect())
        .collect();
    let labels = dir.path().join("labels.xlsx");
    write_sheet(&labels, &["Full File Name", "Class Name"], &rows);

    let run = |out: &str| {
        let out = dir.path().join(out);
        assert_success(&dacprep(&[
            "split",
            labels.to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
            "--seed",
            "3",
        ]));
        Sheet::read(out.join("dac-train.xlsx")).expect("train sheet")
    };
    let first = run("a");
    assert_eq!(first.rows.len(), 20);
    assert_eq!(first, run("b"));
}

#[test]
fn cli_extract_writes_mono_segment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in.wav");
    let output = dir.path().join("segment.wav");
    write_tone(&input, 3.0, 8000);

    assert_success(&dacprep(&[
        "extract",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "--duration",
        "1.5",
        "--seed",
        "1",
    ]));
    let (samples, rate) = WavIo::read_wav(&output).expect("read segment");
    assert_eq!(rate, 8000);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].len(), 12000);
}

#[test]
fn cli_extract_missing_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dacprep(&[
        "extract",
        dir.path().join("missing.wav").to_str().unwrap(),
        dir.path().join("out.wav").to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
}
