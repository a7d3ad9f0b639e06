pub mod assistant;
pub mod delivery;
pub mod digest;
pub mod notification;
pub mod reminder;
pub mod scheduler;
pub mod timezone;
