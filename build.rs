use std::{env, path::PathBuf};
use vara_options_clearing_app::OptionsClearingProgram;

fn main() {
    // Host-only builds (unit tests, tooling) do not need the wasm artifact.
    if env::var_os("CARGO_FEATURE_WASM_BINARY").is_none() {
        return;
    }

    sails_rs::build_wasm();

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR"));
    let idl_path = manifest_dir.join("vara_options_clearing.idl");
    sails_idl_gen::generate_idl_to_file::<OptionsClearingProgram>(idl_path).expect("failed to write IDL");
}
