//! Integration tests for the `crx` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test context with an isolated scratch root and a sample extension.
struct TestContext {
    temp_dir: TempDir,
    scratch: PathBuf,
    source: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let scratch = temp_dir.path().join("scratch");
        let source = temp_dir.path().join("ext");
        std::fs::create_dir_all(source.join("js")).expect("failed to create source");
        std::fs::write(
            source.join("manifest.json"),
            r#"{"name":"demo","version":"1.2.3","manifest_version":2}"#,
        )
        .unwrap();
        std::fs::write(source.join("js/background.js"), "console.log(1);").unwrap();

        Self {
            temp_dir,
            scratch,
            source,
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.temp_dir.path().join(rel)
    }

    fn crx_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_crx");
        let mut cmd = Command::new(bin_path);
        for var in [
            "CRX_KEY",
            "CRX_CODEBASE",
            "CRX_APP_ID",
            "CRX_OPENSSL",
            "CRX_KEY_FILE",
        ] {
            cmd.env_remove(var);
        }
        cmd.env("CRX_SCRATCH_DIR", &self.scratch);
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.crx_cmd().args(args).output().expect("failed to run crx")
    }

    fn keygen(&self, path: &Path) {
        let out = self.run(&["keygen", "-o", path.to_str().unwrap(), "--bits", "2048"]);
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    }

    fn pack(&self, key: &Path, extra: &[&str]) -> Output {
        let mut args = vec![
            "pack",
            self.source.to_str().unwrap(),
            "--key",
            key.to_str().unwrap(),
            "--in-process",
        ];
        args.extend_from_slice(extra);
        self.run(&args)
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn scratch_dirs(root: &Path) -> usize {
    std::fs::read_dir(root).map_or(0, |entries| entries.count())
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("pack"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    assert!(ctx.run(&["--version"]).status.success());
}

#[test]
fn test_keygen_refuses_to_overwrite() {
    let ctx = TestContext::new();
    let key = ctx.path("key.pem");
    ctx.keygen(&key);
    let original = std::fs::read(&key).unwrap();
    assert!(String::from_utf8_lossy(&original).contains("PRIVATE KEY"));

    let again = ctx.run(&["keygen", "-o", key.to_str().unwrap()]);
    assert!(!again.status.success());
    assert_eq!(std::fs::read(&key).unwrap(), original);

    let forced = ctx.run(&["keygen", "-o", key.to_str().unwrap(), "--force"]);
    assert!(forced.status.success());
    assert_ne!(std::fs::read(&key).unwrap(), original);
}

#[test]
fn test_id_is_stable_for_a_key() {
    let ctx = TestContext::new();
    let key = ctx.path("key.pem");
    ctx.keygen(&key);

    let first = stdout(&ctx.run(&["id", "--key", key.to_str().unwrap()]));
    let second = stdout(&ctx.run(&["id", "--key", key.to_str().unwrap()]));
    let id = first.trim();
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| ('a'..='p').contains(&c)));
    assert_eq!(first, second);

    let with_key = stdout(&ctx.run(&["id", "--key", key.to_str().unwrap(), "--manifest-key"]));
    let lines: Vec<&str> = with_key.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], id);
    assert!(lines[1].starts_with("MIIB"));
}

#[test]
fn test_pack_then_verify() {
    let ctx = TestContext::new();
    let key = ctx.path("key.pem");
    ctx.keygen(&key);
    let crx = ctx.path("out/demo.crx");

    let packed = ctx.pack(&key, &["-o", crx.to_str().unwrap()]);
    assert!(packed.status.success(), "{}", String::from_utf8_lossy(&packed.stderr));
    let bytes = std::fs::read(&crx).unwrap();
    assert_eq!(&bytes[..4], b"Cr24");
    assert_eq!(scratch_dirs(&ctx.scratch), 0, "scratch should be cleaned");

    let id = stdout(&ctx.run(&["id", "--key", key.to_str().unwrap()]));
    let verified = ctx.run(&["verify", crx.to_str().unwrap(), "--list"]);
    assert!(verified.status.success());
    let listing = stdout(&verified);
    assert!(listing.contains(id.trim()));
    assert!(listing.contains("js/background.js"));
    assert!(listing.contains("manifest.json"));
}

#[test]
fn test_pack_default_output_sits_beside_source() {
    let ctx = TestContext::new();
    let key = ctx.path("key.pem");
    ctx.keygen(&key);

    assert!(ctx.pack(&key, &[]).status.success());
    assert!(ctx.path("ext.crx").exists());
}

#[test]
fn test_key_inside_source_is_not_packaged() {
    let ctx = TestContext::new();
    let key = ctx.source.join("signing.pem");
    ctx.keygen(&key);
    let crx = ctx.path("demo.crx");

    assert!(ctx.pack(&key, &["-o", crx.to_str().unwrap()]).status.success());
    let listing = stdout(&ctx.run(&["verify", crx.to_str().unwrap(), "--list"]));
    assert!(!listing.contains("signing.pem"));
    assert!(ctx.source.join("signing.pem").exists());
}

#[test]
fn test_in_tree_key_adds_to_default_exclusion() {
    let ctx = TestContext::new();
    ctx.keygen(&ctx.source.join("key.pem"));
    let signing = ctx.source.join("signing.pem");
    ctx.keygen(&signing);
    let crx = ctx.path("demo.crx");

    assert!(ctx.pack(&signing, &["-o", crx.to_str().unwrap()]).status.success());
    let listing = stdout(&ctx.run(&["verify", crx.to_str().unwrap(), "--list"]));
    assert!(listing.contains("manifest.json"));
    assert!(!listing.contains("key.pem"), "key.pem leaked into archive");
    assert!(!listing.contains("signing.pem"));
}

#[test]
fn test_verify_rejects_tampered_package() {
    let ctx = TestContext::new();
    let key = ctx.path("key.pem");
    ctx.keygen(&key);
    let crx = ctx.path("demo.crx");
    assert!(ctx.pack(&key, &["-o", crx.to_str().unwrap()]).status.success());

    let mut bytes = std::fs::read(&crx).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&crx, bytes).unwrap();

    assert!(!ctx.run(&["verify", crx.to_str().unwrap()]).status.success());

    std::fs::write(&crx, b"not a package").unwrap();
    assert!(!ctx.run(&["verify", crx.to_str().unwrap()]).status.success());
}

#[test]
fn test_update_xml_needs_codebase() {
    let ctx = TestContext::new();
    let key = ctx.path("key.pem");
    ctx.keygen(&key);
    let crx = ctx.path("demo.crx");
    let xml = ctx.path("update.xml");

    let failed = ctx.pack(
        &key,
        &["-o", crx.to_str().unwrap(), "--update-xml", xml.to_str().unwrap()],
    );
    assert!(!failed.status.success());
    assert!(!xml.exists());
    assert!(!crx.exists(), "failed run must not leave a package behind");
    assert_eq!(scratch_dirs(&ctx.scratch), 0);

    let packed = ctx.pack(
        &key,
        &[
            "-o",
            crx.to_str().unwrap(),
            "--update-xml",
            xml.to_str().unwrap(),
            "--codebase",
            "https://example.com/demo.crx",
        ],
    );
    assert!(packed.status.success());

    let id = stdout(&ctx.run(&["id", "--key", key.to_str().unwrap()]));
    let content = std::fs::read_to_string(&xml).unwrap();
    assert!(content.contains(&format!("appid='{}'", id.trim())));
    assert!(content.contains("codebase='https://example.com/demo.crx'"));
    assert!(content.contains("version='1.2.3'"));
}

#[test]
fn test_clean_removes_kept_scratch() {
    let ctx = TestContext::new();
    let key = ctx.path("key.pem");
    ctx.keygen(&key);
    let crx = ctx.path("demo.crx");

    assert!(
        ctx.pack(&key, &["-o", crx.to_str().unwrap(), "--keep-scratch"])
            .status
            .success()
    );
    assert_eq!(scratch_dirs(&ctx.scratch), 1);

    assert!(ctx.run(&["clean"]).status.success());
    assert_eq!(scratch_dirs(&ctx.scratch), 0);
}

#[test]
fn test_missing_manifest_fails() {
    let ctx = TestContext::new();
    let key = ctx.path("key.pem");
    ctx.keygen(&key);
    std::fs::remove_file(ctx.source.join("manifest.json")).unwrap();

    let out = ctx.pack(&key, &["-o", ctx.path("demo.crx").to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(!ctx.path("demo.crx").exists());
}
