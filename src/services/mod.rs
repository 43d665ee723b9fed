pub mod intake;
pub mod notifier;
pub mod pipeline;
pub mod presence;
pub mod staging;
