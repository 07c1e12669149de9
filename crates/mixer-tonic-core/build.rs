/// Builds the gRPC client and server code for the `mixer.proto` definition
/// using `tonic-prost-build`.
///
/// The Protocol Buffer compiler comes from `protoc-bin-vendored`, so building
/// does not depend on a system `protoc`. Its bundled include directory
/// provides the `google/protobuf` well-known types the schema imports; prost
/// maps those to `prost-types`.
///
/// # Files and Paths
///
/// - Proto file: `proto/mixer/v1/mixer.proto`
/// - Includes: `proto/` and the vendored well-known types
/// - Descriptor set: `$OUT_DIR/mixer_descriptor.bin` (served through gRPC
///   reflection)
///
/// # Panics
///
/// Panics if the vendored compiler cannot be located or code generation
/// fails.
///
/// # Output
///
/// Generated code is included via:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("mixer.v1");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("mixer_descriptor.bin");

    let protoc = protoc_bin_vendored::protoc_bin_path().unwrap();
    let well_known = protoc_bin_vendored::include_path().unwrap();

    let mut config = tonic_prost_build::Config::new();
    config
        .protoc_executable(protoc)
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(
            config,
            &[PathBuf::from("proto/mixer/v1/mixer.proto")],
            &[PathBuf::from("proto"), well_known],
        )
        .unwrap();

    println!("cargo:rerun-if-changed=proto/mixer/v1/mixer.proto");
}
