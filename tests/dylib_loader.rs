//! Loading real plugin libraries through `DylibLoader`.
//!
//! Builds `demos/sample-plugins`, so it is ignored by default:
//! `cargo test --test dylib_loader -- --ignored`

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::Path;
use std::process::Command;

use markup_proxy::plugin::Capabilities;
use markup_proxy::plugins::{secure_open, DylibLoader, PluginError, PluginLoader};

#[test]
#[ignore = "compiles demos/sample-plugins"]
fn test_sample_plugins_load_from_cdylib() {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/sample-plugins/Cargo.toml");
    let target = tempfile::tempdir().unwrap();
    let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let status = Command::new(cargo)
        .args(["build", "--quiet", "--manifest-path"])
        .arg(&manifest)
        .arg("--target-dir")
        .arg(target.path())
        .status()
        .unwrap();
    assert!(status.success(), "sample plugins failed to build");

    let file_name = format!("{}sample_plugins{}", DLL_PREFIX, DLL_SUFFIX);
    let plugin_dir = tempfile::tempdir().unwrap();
    let lib = plugin_dir.path().join(&file_name);
    std::fs::copy(target.path().join("debug").join(&file_name), &lib).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&lib, std::fs::Permissions::from_mode(0o644)).unwrap();
    }

    let path = secure_open(&lib, &[plugin_dir.path().to_path_buf()]).unwrap();

    // static instance export
    let html = DylibLoader.load(&path, "HtmlModifierPlugin").unwrap();
    assert!(html.library.is_some());
    assert_eq!(html.instance.capabilities(), Capabilities::MARKUP);

    // factory export
    let xml = DylibLoader.load(&path, "XmlTransformerPlugin").unwrap();
    assert_eq!(xml.instance.capabilities(), Capabilities::ELEMENT);

    let err = DylibLoader.load(&path, "MissingPlugin").err().unwrap();
    assert!(matches!(err, PluginError::MissingExport { .. }));
}
