pub mod complete_refund_command;
pub mod create_refund_command;
pub mod process_order_payment_command;

pub use complete_refund_command::CompleteRefundCommand;
pub use create_refund_command::CreateRefundCommand;
pub use process_order_payment_command::ProcessOrderPaymentCommand;
