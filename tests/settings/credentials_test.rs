//! Credential loading from the private `.env` file.

use wpe_backup::credentials::{
    enforce_private_file_permissions, load_env_credentials, ApiCredentials,
};

#[test]
fn absent_file_is_not_an_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let loaded = load_env_credentials(&tmp.path().join(".env")).expect("load");
    assert!(loaded.is_none());
}

#[test]
fn both_keys_are_required() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join(".env");
    std::fs::write(&path, "WPE_API_USERNAME=only-user\nOTHER=1\n").expect("write");
    enforce_private_file_permissions(&path).expect("chmod");

    assert!(load_env_credentials(&path).expect("load").is_none());
}

#[test]
fn reads_quoted_values() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join(".env");
    std::fs::write(
        &path,
        "# api access\nWPE_API_USERNAME=\"user one\"\nWPE_API_PASSWORD='p@ss=word'\n",
    )
    .expect("write");
    enforce_private_file_permissions(&path).expect("chmod");

    let loaded = load_env_credentials(&path).expect("load").expect("credentials");
    assert_eq!(loaded, ApiCredentials::new("user one", "p@ss=word"));
}

#[cfg(unix)]
#[test]
fn world_readable_file_is_refused() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join(".env");
    std::fs::write(&path, "WPE_API_USERNAME=u\nWPE_API_PASSWORD=p\n").expect("write");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).expect("chmod");

    let err = load_env_credentials(&path).expect_err("should refuse");
    assert!(err.to_string().contains("0600"), "{err}");
}

#[test]
fn debug_output_hides_the_password() {
    let credentials = ApiCredentials::new("user", "hunter2");
    let rendered = format!("{credentials:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("[REDACTED]"));
}

#[test]
fn basic_auth_header_encodes_pair() {
    let credentials = ApiCredentials::new("user", "pass");
    assert_eq!(credentials.basic_auth_header(), "Basic dXNlcjpwYXNz");
    assert!(!ApiCredentials::new("user", " ").is_complete());
}
