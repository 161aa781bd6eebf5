// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generated Protobuf types for outbox/queue wire payloads (§6), compiled
//! from `proto/payauth/v1/events.proto` by `build.rs` via `tonic-prost-build`.
//! Re-exported rather than inlined so callers write `proto::EventEnvelope`
//! instead of reaching into the Cargo `OUT_DIR` module path directly.

#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/payauth.v1.rs"));
