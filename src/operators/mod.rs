mod portainer;

pub use portainer::PortainerExecOperator;
