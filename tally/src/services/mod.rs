mod payments;

pub use payments::{PaymentDomain, PaymentService};
