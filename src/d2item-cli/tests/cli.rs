use d2item::{GameMode, Item, ItemVersion, Registry};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn d2item(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_d2item"))
        .args(args)
        .env("D2ITEM_CONFIG", config_dir.join("config.toml"))
        .env_remove("D2ITEM_VERSION")
        .env_remove("D2ITEM_MODE")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_cap(path: &Path) -> Vec<u8> {
    let cap = Item::builder("cap", Registry::builtin())
        .version(ItemVersion::V110)
        .magic(1, 3)
        .build()
        .unwrap();
    let bytes = cap.to_bytes();
    fs::write(path, &bytes).unwrap();
    bytes
}

#[test]
fn test_decode_encode_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("cap.bin");
    let tree = dir.path().join("cap.json");
    let encoded = dir.path().join("cap2.bin");
    let original = write_cap(&record);

    let out = d2item(
        dir.path(),
        &["decode", record.to_str().unwrap(), "-V", "v110", "-o", tree.to_str().unwrap()],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = fs::read_to_string(&tree).unwrap();
    assert!(text.contains("\"type\": \"cap\""));

    let out = d2item(
        dir.path(),
        &["encode", tree.to_str().unwrap(), "-o", encoded.to_str().unwrap(), "-V", "v110"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(fs::read(&encoded).unwrap(), original);
}

#[test]
fn test_convert_writes_backup() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("cap.bin");
    let original = write_cap(&record);

    let out = d2item(
        dir.path(),
        &["convert", record.to_str().unwrap(), "--from", "v110", "--to", "v160"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(fs::read(dir.path().join("cap.bin.bak")).unwrap(), original);

    let converted = fs::read(&record).unwrap();
    let item = Item::from_bytes(
        &converted,
        ItemVersion::V160,
        GameMode::Expansion,
        Registry::builtin(),
    )
    .unwrap();
    assert_eq!(item.code(), "cap");
}

#[test]
fn test_edit_and_yaml_decode() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("cap.bin");
    write_cap(&record);

    let out = d2item(
        dir.path(),
        &["edit", record.to_str().unwrap(), "-V", "v110", "--no-backup", "personalize", "Gheed"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(!dir.path().join("cap.bin.bak").exists());

    let out = d2item(
        dir.path(),
        &["decode", record.to_str().unwrap(), "-V", "v110", "--yaml", "--style", "pascal"],
    );
    assert!(out.status.success());
    assert!(stdout(&out).contains("PersonalizedName: Gheed"));
}

#[test]
fn test_configured_version_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("cap.bin");
    write_cap(&record);

    let out = d2item(dir.path(), &["configure", "--item-version", "v110"]);
    assert!(out.status.success());
    assert!(dir.path().join("config.toml").exists());

    let out = d2item(dir.path(), &["inspect", record.to_str().unwrap()]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains("Sturdy Cap of Strength [cap]"));
}

#[test]
fn test_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("marker.bin");
    fs::write(&path, b"JM").unwrap();

    let out = d2item(dir.path(), &["checksum", path.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("(225)"));
}

#[test]
fn test_bad_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.bin");
    fs::write(&path, [0xFFu8; 4]).unwrap();

    let out = d2item(dir.path(), &["decode", path.to_str().unwrap(), "-V", "v110"]);
    assert!(!out.status.success());
}
