pub mod attendee;
pub mod event_day;
pub mod event_session;
pub mod payment_method;
pub mod ticket;
pub mod ticket_price;
pub mod transaction;

pub use attendee::{Attendee, AttendeeDetails, ChildDetails, InstitutionType, StudentDetails};
pub use event_day::EventDay;
pub use event_session::{EntryWindow, EventSession};
pub use payment_method::PaymentMethod;
pub use ticket::{
    AppliedDefault, AuditStep, DuplicateLink, PaymentStatus, Ticket, TicketMetadata, TicketSource,
    TicketStatus,
};
pub use ticket_price::{TicketPrice, TicketType};
pub use transaction::{PaymentTransaction, TransactionStatus};
