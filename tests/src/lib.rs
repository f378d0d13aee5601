//! # Edge-ISC Test Suite
//!
//! Unified test crate for cross-service choreography over the in-memory
//! broker.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── discovery.rs    # Rollcall across running services
//!     ├── dispatch.rs     # Dispatch chain ordering over the bus
//!     ├── properties.rs   # Service/proxy property round trips
//!     ├── telemetry.rs    # Logging bootstrap smoke tests
//!     └── timeouts.rs     # Deadlines, slot discipline, late replies
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p edge-isc-tests
//!
//! # By category
//! cargo test -p edge-isc-tests integration::discovery::
//! cargo test -p edge-isc-tests integration::properties::
//! cargo test -p edge-isc-tests integration::timeouts::
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
