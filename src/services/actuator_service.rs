use std::error::Error;

use async_trait::async_trait;

/// Hardware hook behind command dispatch. Implementations supply the actual
/// relay/GPIO call; the controller only sees this trait.
#[async_trait]
pub trait DeviceAction: Send + Sync {
    async fn open_door(&self) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Default action for devices without a wired relay: log the unlock and do
/// nothing else.
pub struct LogDeviceAction;

#[async_trait]
impl DeviceAction for LogDeviceAction {
    async fn open_door(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::info!("door unlocked");

        Ok(())
    }
}
