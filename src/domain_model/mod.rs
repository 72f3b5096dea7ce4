mod registration;
mod role;
mod schedule;
mod session;
mod user;

pub use registration::*;
pub use role::*;
pub use schedule::*;
pub use session::*;
pub use user::*;
