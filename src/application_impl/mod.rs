mod auth_service_fake;
mod auth_service_impl;
mod login_flow;
mod user_service_impl;

pub use auth_service_fake::*;
pub use auth_service_impl::*;
pub use login_flow::*;
pub use user_service_impl::*;
