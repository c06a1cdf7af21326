// Build script for file-service
// Compiles file_service.proto and auth_service.proto into server and client code,
// plus a descriptor set for gRPC reflection.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=../proto/services/file_service.proto");
    println!("cargo:rerun-if-changed=../proto/services/auth_service.proto");

    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);

    tonic_build::configure()
        .build_server(true)
        .build_client(true) // Client code is used by the file_client binary and integration tests
        .file_descriptor_set_path(out_dir.join("file_service_descriptor.bin"))
        .compile_protos(
            &[
                "../proto/services/file_service.proto",
                "../proto/services/auth_service.proto",
            ],
            &["../proto/services"],
        )?;

    Ok(())
}
