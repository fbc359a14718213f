#[path = "../common/mod.rs"]
mod common;

use common::{assert_success, dacprep, list_names, write_tone};
use dacprep::DacFile;

fn should_run() -> bool {
    std::env::var("DACPREP_E2E").map(|v| v == "1").unwrap_or(false)
}

#[test]
fn cli_encode_writes_dac_files() {
    if !should_run() {
        eprintln!("Skipping E2E test; set DACPREP_E2E=1 to enable.");
        return;
    }

    assert_success(&dacprep(&["download", "44khz/8kbps"]));

    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    std::fs::create_dir(&input).expect("mkdir");
    write_tone(&input.join("short.wav"), 1.0, 44100);
    write_tone(&input.join("long.wav"), 7.0, 22050);

    assert_success(&dacprep(&[
        "encode",
        "--input-dir",
        input.to_str().unwrap(),
        "--output-dir",
        output.to_str().unwrap(),
        "--class-name",
        "Zelda",
        "--param1",
        "0.5",
        "--device",
        "cpu",
    ]));

    let names = list_names(&output);
    assert_eq!(
        names,
        vec!["Zelda--param1-00.50.dac", "Zelda--param1-00.50_1.dac"]
    );
    for name in names {
        let dac = DacFile::load(output.join(&name)).expect("load dac");
        assert_eq!(dac.n_quantizers(), 4);
        assert_eq!(dac.channels(), 2);
        assert!(dac.frames() > 0);
        assert!(dac.codes.iter().all(|&code| code < 1024));
    }
}

#[test]
fn cli_encode_randomized_param_is_seeded() {
    if !should_run() {
        eprintln!("Skipping E2E test; set DACPREP_E2E=1 to enable.");
        return;
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("clip.wav");
    write_tone(&input, 0.5, 44100);

    let encode = |out: &std::path::Path| {
        assert_success(&dacprep(&[
            "encode",
            "--input-dir",
            input.to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
            "--class-name",
            "Link",
            "--randomize-param1",
            "--seed",
            "7",
        ]));
        list_names(out)
    };
    let first = encode(&dir.path().join("a"));
    let second = encode(&dir.path().join("b"));
    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
    assert!(first[0].starts_with("Link--param1-"));
}
