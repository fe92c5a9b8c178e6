// Domain layer: core models and ports (interfaces). Concrete collaborators live under adapters/.

pub mod model;
pub mod ports;
