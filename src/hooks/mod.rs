mod portainer;

pub use portainer::{
    PortainerHook, DEFAULT_API_VERSION, DEFAULT_ENDPOINT_ID, DEFAULT_TIMEOUT_SECS,
};
