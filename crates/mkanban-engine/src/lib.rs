pub mod bus;
pub mod clock;
pub mod daemon;
pub mod engine;
pub mod executors;
pub mod missed;
pub mod ports;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod settings;

pub use bus::EventBus;
pub use engine::ActionEngine;
pub use missed::MissedActionsManager;
pub use runtime::{ActionsRuntime, RuntimeDeps};
pub use service::ActionService;
pub use settings::SharedConfig;
