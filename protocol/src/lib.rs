//! Wire-level types shared between status providers, the status service and
//! the UI layers that render merged status lists.

mod diagnostic;
mod status;

pub use diagnostic::Diagnostic;
pub use diagnostic::DiagnosticEntry;
pub use diagnostic::DiagnosticSeverity;
pub use diagnostic::Position;
pub use diagnostic::Range;
pub use status::CheckScope;
pub use status::Status;
pub use status::StatusCompletion;
pub use status::StatusResult;
pub use status::StatusState;
pub use status::WrappedStatus;
