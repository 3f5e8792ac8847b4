fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Prefer a protoc from the environment, fall back to the vendored one
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    println!("cargo:rerun-if-changed=proto");
    tonic_prost_build::configure().compile_protos(
        &["proto/tfplugin6.proto", "proto/plugin.proto"],
        &["proto"],
    )?;
    Ok(())
}
