mod command;
mod connect;
mod publish;
mod stream;

pub use command::CommandChannelError;
pub use connect::ConnectError;
pub use publish::PublishError;
pub use stream::LaunchError;
