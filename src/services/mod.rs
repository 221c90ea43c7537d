pub mod importer;
pub mod payment;
pub mod purchase;
pub mod ticket_lifecycle;
pub mod validation;
pub mod verifier;

pub use importer::{parse_csv, BulkImportSummary, CsvImportReport, CsvParseReport, CsvRow, ImportService};
pub use payment::{PaymentService, PaymentStatusView, PaymentSubmission, PaymentVerification};
pub use purchase::{PurchaseResult, PurchaseService};
pub use ticket_lifecycle::{CodeKind, TicketLifecycleManager};
pub use validation::{TicketRequest, ValidationEngine, ValidationMode, ValidationOutcome};
pub use verifier::{ScanStep, TicketVerifier, VerificationResult};
