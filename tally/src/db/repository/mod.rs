mod entries;
mod payments;

pub use entries::EntryRepository;
pub use payments::PaymentRepository;
