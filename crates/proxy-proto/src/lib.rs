//! proxy-proto — protobuf message types and gRPC bindings for the IAM and
//! service-manager control plane APIs.
//!
//! The `iamanager.v5.rs` / `servicemanager.v4.rs` modules are generated with
//! prost/tonic from the control plane API definitions and checked in, so a
//! workspace build does not need protoc. Regenerate them when the API
//! version is bumped, not by hand-editing.

pub mod iamanager {
    pub mod v5 {
        include!("iamanager.v5.rs");
    }
}

pub mod servicemanager {
    pub mod v4 {
        include!("servicemanager.v4.rs");
    }
}
