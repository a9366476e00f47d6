use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    if env::var_os("PROTOC").is_none() {
        env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
    }

    prost_build::Config::new()
        .out_dir(&out_dir)
        .compile_protos(
            &[
                "proto/collector.proto",
                "proto/monitor.proto",
                "proto/envelope.proto",
            ],
            &["proto"],
        )
        .expect("failed to compile protobuf schemas");

    println!("cargo:rerun-if-changed=proto/collector.proto");
    println!("cargo:rerun-if-changed=proto/monitor.proto");
    println!("cargo:rerun-if-changed=proto/envelope.proto");
}
