pub mod amount;
pub mod clock;
pub mod phone;

pub use amount::{format_amount, parse_amount};
pub use clock::{Clock, EventClock, FixedClock, SystemClock};
pub use phone::{is_valid_phone, normalize_phone};
