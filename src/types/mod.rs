mod caller;
mod limits;
mod models;
mod permission;
pub mod version;

pub use caller::{Caller, ServiceAccountCaller, SystemCaller, UserCaller};
pub use limits::LimitName;
pub use models::*;
pub use permission::Permission;
