mod error;
mod facade;
mod grouped;
#[cfg(test)]
mod tests;

pub use error::AvailabilityError;
pub use facade::AvailabilityFacade;
pub use grouped::GroupedAvailability;
