pub mod habit;
pub mod note;
pub mod reminder;
pub mod task;
pub mod user;

pub use habit::*;
pub use note::*;
pub use reminder::*;
pub use task::*;
pub use user::*;
