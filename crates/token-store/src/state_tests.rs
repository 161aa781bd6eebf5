use super::*;

fn write_temp_json(contents: &str) -> tempfile_path::TempJsonFile {
    tempfile_path::TempJsonFile::new(contents)
}

/// Minimal scratch-file helper; this crate has no `tempfile` dependency of
/// its own, so we write directly under `std::env::temp_dir()`.
mod tempfile_path {
    pub struct TempJsonFile {
        pub path: std::path::PathBuf,
    }

    impl TempJsonFile {
        pub fn new(contents: &str) -> Self {
            let path = std::env::temp_dir().join(format!("token-store-test-{}.json", uuid::Uuid::new_v4()));
            let mut file = std::fs::File::create(&path).expect("create temp file");
            use std::io::Write as _;
            file.write_all(contents.as_bytes()).expect("write temp file");
            Self { path }
        }
    }

    impl Drop for TempJsonFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[test]
fn load_api_keys_parses_a_flat_json_map() {
    let file = write_temp_json(r#"{"sk_live_abc": "restaurant_1"}"#);
    let keys = load_api_keys(&file.path).unwrap();
    assert_eq!(keys.get("sk_live_abc").map(String::as_str), Some("restaurant_1"));
}

#[test]
fn load_partner_keys_decodes_hex_into_32_bytes() {
    let file = write_temp_json(&format!(r#"{{"partner_1": "{}"}}"#, "ab".repeat(32)));
    let keys = load_partner_keys(&file.path).unwrap();
    assert_eq!(keys.get("partner_1"), Some(&[0xabu8; 32]));
}

#[test]
fn load_partner_keys_rejects_material_of_the_wrong_length() {
    let file = write_temp_json(r#"{"partner_1": "ab"}"#);
    assert!(load_partner_keys(&file.path).is_err());
}

#[test]
fn load_service_keys_parses_version_numbers_from_string_keys() {
    let file = write_temp_json(&format!(r#"{{"1": "{}", "2": "{}"}}"#, "11".repeat(32), "22".repeat(32)));
    let keys = load_service_keys(&file.path).unwrap();
    assert_eq!(keys.get(&1), Some(&[0x11u8; 32]));
    assert_eq!(keys.get(&2), Some(&[0x22u8; 32]));
}
