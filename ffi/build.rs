//! Generates `http_request.h` for C callers into `OUT_DIR`.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");

    let (Ok(crate_dir), Ok(out_dir)) = (env::var("CARGO_MANIFEST_DIR"), env::var("OUT_DIR")) else {
        return;
    };
    let header = PathBuf::from(out_dir).join("http_request.h");

    match cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("HTTP_REQUEST_H")
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(&header);
        }
        // A missing header never fails the build.
        Err(e) => println!("cargo:warning=could not generate {}: {e}", header.display()),
    }
}
