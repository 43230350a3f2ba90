//! Detection module for StegCheckr

mod result;

pub use result::{
    DetectionReport, EmbeddedFile, EmbeddedStatus, FailureReason, Finding, MethodFailure, Severity,
    Verdict,
};
