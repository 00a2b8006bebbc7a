//! Integration tests for the tenancy controllers
//!
//! Tests are organized by the story they tell:
//!
//! - `crd_operations`: creating and reading Org and Space resources through
//!   the Kubernetes API, including schema validation
//!
//! - `hierarchy_lifecycle`: running the controllers against a live cluster
//!   and watching boundaries, credentials and identities appear and go away
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --test-threads=1
//! ```

mod helpers;
mod hierarchy_lifecycle;
