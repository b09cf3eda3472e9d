mod settings;

pub use settings::{
    CommandSource, Controller, Device, Gateway, GatewayAuth, Logger, Settings, Stream,
};
