// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure()
        .build_server(false)
        .build_client(false)
        .compile_protos(&["../../proto/payauth/v1/events.proto"], &["../../proto"])?;

    println!("cargo:rerun-if-changed=../../proto/payauth/v1/events.proto");

    Ok(())
}
