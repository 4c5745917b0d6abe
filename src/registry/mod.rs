//! # Registry Infrastructure
//!
//! Read-mostly registries installed once at startup and shared by every
//! caller.
//!
//! ## Available Registries
//!
//! - **OperationClassifier**: operation name → dispatch policy, argument shape
//!   and serving capability, validated against the linked engine surface
//!
//! ## Usage
//!
//! ```rust
//! use resolver_gateway::registry::{OperationClassifier, OperationPolicy};
//!
//! let surface = OperationClassifier::expected_surface();
//! let classifier = OperationClassifier::build(&surface).unwrap();
//! assert_eq!(classifier.classify("add_record").policy, OperationPolicy::Retryable);
//! assert_eq!(classifier.classify("destroy").policy, OperationPolicy::Unsupported);
//! ```

pub mod operation_classifier;

pub use operation_classifier::{
    Availability, ClassifierReport, OperationClassifier, OperationDescriptor, OperationPolicy,
};
