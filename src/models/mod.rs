pub mod order;
pub mod order_commission;
pub mod order_item;
pub mod order_tax;
pub mod payment;
pub mod payment_refund;
pub mod vendor;
pub mod vendor_order;
pub mod vendor_settlement;

pub use order::Entity as Order;
pub use order_commission::Entity as OrderCommission;
pub use order_item::Entity as OrderItem;
pub use order_tax::Entity as OrderTax;
pub use payment::Entity as Payment;
pub use payment_refund::Entity as PaymentRefund;
pub use vendor::Entity as Vendor;
pub use vendor_order::Entity as VendorOrder;
pub use vendor_settlement::Entity as VendorSettlement;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// `{prefix}-YYYYMMDD-XXXXXXXX` with an uppercase alphanumeric suffix.
pub(crate) fn document_number(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d"), suffix)
}
