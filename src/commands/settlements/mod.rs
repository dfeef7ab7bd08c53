pub mod process_settlements_command;
pub mod retry_failed_settlements_command;

pub use process_settlements_command::ProcessSettlementsCommand;
pub use retry_failed_settlements_command::RetryFailedSettlementsCommand;
