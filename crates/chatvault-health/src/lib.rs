//! chatvault-health — health evaluation for the archive stack.
//!
//! One evaluation probes system resources, the API, the datastore, the
//! cache, the background workers, and the external dependency, then
//! aggregates every recorded check into a single report whose overall
//! status is the maximum severity seen. Rendering (plain text,
//! monitoring one-liner, JSON) is purely presentational.

pub mod checks;
pub mod probe;
pub mod report;
pub mod system;

pub use checks::{HealthEngine, RequestedChecks};
pub use report::{CheckEntry, HealthReport, OutputFormat, Severity};
