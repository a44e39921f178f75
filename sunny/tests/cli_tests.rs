use std::process::Command;

fn sunny() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sunny"))
}

#[test]
fn existing_model_exits_with_one() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let save_folder = dir.path().join("run");
    std::fs::create_dir_all(&save_folder)?;
    std::fs::write(save_folder.join("trained_model.safetensors"), b"keep me")?;

    let output = sunny()
        .arg("train")
        .arg("--data-path")
        .arg(dir.path().join("missing.safetensors"))
        .arg("--save-folder")
        .arg(&save_folder)
        .args(["--device", "cpu"])
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));
    assert!(!save_folder.join("trained_model_loss.txt").exists());
    Ok(())
}

#[test]
fn simulate_then_info() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let data_file = dir.path().join("pops.safetensors");

    let status = sunny()
        .arg("simulate")
        .arg("--out")
        .arg(&data_file)
        .args(["--n-train", "4", "--n-val", "2", "--n-features", "6", "--window", "3"])
        .status()?;
    assert!(status.success());
    assert!(data_file.exists());

    // no silent overwrite
    let status = sunny().arg("simulate").arg("--out").arg(&data_file).status()?;
    assert_eq!(status.code(), Some(1));

    let output = sunny().arg("info").arg(&data_file).output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("train: 4 samples"));
    assert!(stdout.contains("val: 2 samples"));
    Ok(())
}
