mod navigation;
mod session_store;
mod subscription;

pub use navigation::*;
pub use session_store::*;
pub use subscription::*;
