use std::path::Path;

use testu01_threads::plugin::{ModuleLoadError, PluginModule};

#[test]
fn loading_a_nonexistent_library_reports_open_error() {
    let err = PluginModule::load(Path::new("/nonexistent/generator.so")).unwrap_err();
    assert!(matches!(err, ModuleLoadError::OpenError(_)));
}

#[test]
fn loading_a_non_library_file_reports_open_error() {
    // `Cargo.toml` exists but is not a valid shared object; `dlopen` must
    // reject it rather than this crate attempting to parse it.
    let err = PluginModule::load(Path::new("Cargo.toml")).unwrap_err();
    assert!(matches!(err, ModuleLoadError::OpenError(_)));
}
