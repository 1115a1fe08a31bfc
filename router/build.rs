//! Compiles the vendored subset of the Envoy External Processor protobuf
//! contract into Rust code.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        let protoc_path = protoc_bin_vendored::protoc_bin_path()?;
        unsafe {
            std::env::set_var("PROTOC", protoc_path);
        }
    }

    tonic_build::configure()
        .build_server(true)
        // Client code is useful for integration tests and debugging tools.
        .build_client(true)
        .compile_protos(
            &["proto/envoy/service/ext_proc/v3/external_processor.proto"],
            &["proto/"],
        )?;

    // prost-build escapes the `type` package segment as a raw identifier when
    // naming the generated file (envoy.r#type.v3.rs), but `include_proto!`
    // looks up the file by the plain package name. Normalize the filename so
    // the include! in lib.rs resolves.
    let out_dir = std::env::var("OUT_DIR")?;
    let escaped = std::path::Path::new(&out_dir).join("envoy.r#type.v3.rs");
    let expected = std::path::Path::new(&out_dir).join("envoy.type.v3.rs");
    if escaped.exists() {
        std::fs::rename(escaped, expected)?;
    }

    println!("cargo:rerun-if-changed=proto/");

    Ok(())
}
