//! Build script for generating protobuf code
//!
//! Code generation only runs with the `proto-gen` feature, which requires
//! protoc. Without the feature the checked-in types in `src/proto` are used.

use std::path::PathBuf;
use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Re-run if proto files change
    println!("cargo:rerun-if-changed=../../proto/goldmane/api.proto");

    if std::env::var_os("CARGO_FEATURE_PROTO_GEN").is_none() {
        return Ok(());
    }

    // Check if protoc is available
    let protoc_available =
        std::env::var("PROTOC").is_ok() || Command::new("protoc").arg("--version").output().is_ok();

    if !protoc_available {
        return Err(
            "the proto-gen feature needs protoc; install it, set PROTOC, or build without proto-gen"
                .into(),
        );
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    // The exporter only consumes the Flows service
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .out_dir(&out_dir)
        .compile(&["../../proto/goldmane/api.proto"], &["../../proto"])?;

    Ok(())
}
