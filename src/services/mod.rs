mod actuator_service;
mod command_service;
mod controller_service;
mod publisher_service;
mod stream_service;

pub use actuator_service::*;
pub use command_service::*;
pub use controller_service::*;
pub use publisher_service::*;
pub use stream_service::*;
