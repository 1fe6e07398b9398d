//! proxyd — the Aos message proxy daemon.
//!
//! Bridges the host's multiplexed byte pipe to the IAM and service-manager
//! gRPC streams: framing and checksums on the host side, supervised
//! bidirectional streams on the cloud side, TLS on the designated ports,
//! and local handling of clock-sync and image-content requests.

pub mod cmclient;
pub mod cmconnection;
pub mod credentials;
pub mod daemon;
pub mod framing;
pub mod iamclient;
pub mod iamconnection;
pub mod mux;
pub mod outbox;
pub mod pipe;
pub mod supervisor;
pub mod transport;
