use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_vendors_table::Migration),
            Box::new(m20240301_000002_create_order_tables::Migration),
            Box::new(m20240301_000003_create_payment_tables::Migration),
            Box::new(m20240301_000004_create_vendor_settlements_table::Migration),
        ]
    }
}

/// Money column precision. SQLite's decimal affinity caps precision at 16 digits.
fn money_precision(manager: &SchemaManager) -> u32 {
    match manager.get_database_backend() {
        ::sea_orm::DbBackend::Sqlite => 16,
        _ => 19,
    }
}

// Migration implementations

mod m20240301_000001_create_vendors_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_vendors_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Vendors::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Vendors::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Vendors::Name).string().not_null())
                        .col(ColumnDef::new(Vendors::CommissionRate).decimal_len(5, 4).null())
                        .col(
                            ColumnDef::new(Vendors::PreferredPaymentMethod)
                                .string_len(32)
                                .null(),
                        )
                        .col(ColumnDef::new(Vendors::PayoutMethod).string_len(32).null())
                        .col(
                            ColumnDef::new(Vendors::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vendors::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Vendors::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Vendors {
        Table,
        Id,
        Name,
        CommissionRate,
        PreferredPaymentMethod,
        PayoutMethod,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_order_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let precision = super::money_precision(manager);
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal_len(precision, 4).not_null())
                        .col(ColumnDef::new(Orders::Tax).decimal_len(precision, 4).not_null())
                        .col(ColumnDef::new(Orders::Total).decimal_len(precision, 4).not_null())
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_customer_id")
                        .table(Orders::Table)
                        .col(Orders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(VendorOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(VendorOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(VendorOrders::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(VendorOrders::VendorOrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(VendorOrders::VendorId).uuid().not_null())
                        .col(
                            ColumnDef::new(VendorOrders::Subtotal)
                                .decimal_len(precision, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(VendorOrders::Tax).decimal_len(precision, 4).not_null())
                        .col(
                            ColumnDef::new(VendorOrders::Total)
                                .decimal_len(precision, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VendorOrders::CommissionAmount)
                                .decimal_len(precision, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(VendorOrders::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(VendorOrders::FulfillmentType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(VendorOrders::VendorNotes).text().null())
                        .col(
                            ColumnDef::new(VendorOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VendorOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VendorOrders::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_vendor_orders_order_id")
                                .from(VendorOrders::Table, VendorOrders::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_vendor_orders_order_id")
                        .table(VendorOrders::Table)
                        .col(VendorOrders::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_vendor_orders_vendor_id")
                        .table(VendorOrders::Table)
                        .col(VendorOrders::VendorId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::VendorOrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariationId).uuid().null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::Price).decimal_len(precision, 4).not_null())
                        .col(
                            ColumnDef::new(OrderItems::Subtotal)
                                .decimal_len(precision, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::DigitalDelivery).json().null())
                        .col(ColumnDef::new(OrderItems::ReturnWindowDays).integer().null())
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_vendor_order_id")
                                .from(OrderItems::Table, OrderItems::VendorOrderId)
                                .to(VendorOrders::Table, VendorOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderTaxes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderTaxes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderTaxes::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderTaxes::VendorOrderId).uuid().null())
                        .col(ColumnDef::new(OrderTaxes::Name).string().not_null())
                        .col(ColumnDef::new(OrderTaxes::Rate).decimal_len(9, 6).not_null())
                        .col(ColumnDef::new(OrderTaxes::Amount).decimal_len(precision, 4).not_null())
                        .col(
                            ColumnDef::new(OrderTaxes::Inclusive)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(OrderTaxes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_taxes_order_id")
                                .from(OrderTaxes::Table, OrderTaxes::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderCommissions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderCommissions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderCommissions::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderCommissions::VendorOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderCommissions::VendorId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderCommissions::Rate)
                                .decimal_len(5, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderCommissions::Amount)
                                .decimal_len(precision, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderCommissions::Name).string().not_null())
                        .col(
                            ColumnDef::new(OrderCommissions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_commissions_vendor_order_id")
                                .from(OrderCommissions::Table, OrderCommissions::VendorOrderId)
                                .to(VendorOrders::Table, VendorOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderCommissions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderTaxes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(VendorOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        Subtotal,
        Tax,
        Total,
        Currency,
        Status,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }

    #[derive(DeriveIden)]
    enum VendorOrders {
        Table,
        Id,
        OrderId,
        VendorOrderNumber,
        VendorId,
        Subtotal,
        Tax,
        Total,
        CommissionAmount,
        Status,
        FulfillmentType,
        VendorNotes,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        VendorOrderId,
        ProductId,
        VariationId,
        Quantity,
        Price,
        Subtotal,
        DigitalDelivery,
        ReturnWindowDays,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderTaxes {
        Table,
        Id,
        OrderId,
        VendorOrderId,
        Name,
        Rate,
        Amount,
        Inclusive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderCommissions {
        Table,
        Id,
        OrderId,
        VendorOrderId,
        VendorId,
        Name,
        Rate,
        Amount,
        CreatedAt,
    }
}

mod m20240301_000003_create_payment_tables {

    use super::m20240301_000002_create_order_tables::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_payment_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let precision = super::money_precision(manager);
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Payments::VendorId).uuid().null())
                        .col(ColumnDef::new(Payments::ParentPaymentId).uuid().null())
                        .col(ColumnDef::new(Payments::Method).string_len(32).not_null())
                        .col(ColumnDef::new(Payments::PaymentType).string_len(32).not_null())
                        .col(ColumnDef::new(Payments::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Payments::Amount).decimal_len(precision, 4).not_null())
                        .col(ColumnDef::new(Payments::VendorAmount).decimal_len(precision, 4).null())
                        .col(ColumnDef::new(Payments::PlatformFee).decimal_len(precision, 4).null())
                        .col(ColumnDef::new(Payments::Currency).string_len(3).not_null())
                        .col(
                            ColumnDef::new(Payments::IsSplitPayment)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Payments::SplitDetails).json().null())
                        .col(ColumnDef::new(Payments::TransactionId).string().null())
                        .col(
                            ColumnDef::new(Payments::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Payments::GatewayResponse).json().null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        // Orders referenced by payments are soft-deleted only.
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_order_id")
                                .from(Payments::Table, Payments::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_parent_payment_id")
                                .from(Payments::Table, Payments::ParentPaymentId)
                                .to(Payments::Table, Payments::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_payments_order_id", Payments::OrderId),
                ("idx_payments_parent_payment_id", Payments::ParentPaymentId),
                ("idx_payments_status", Payments::Status),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Payments::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_table(
                    Table::create()
                        .table(PaymentRefunds::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentRefunds::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentRefunds::PaymentId).uuid().not_null())
                        .col(
                            ColumnDef::new(PaymentRefunds::Amount)
                                .decimal_len(precision, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentRefunds::Reason).string().null())
                        .col(
                            ColumnDef::new(PaymentRefunds::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentRefunds::TransactionId).string().null())
                        .col(ColumnDef::new(PaymentRefunds::GatewayResponse).json().null())
                        .col(
                            ColumnDef::new(PaymentRefunds::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRefunds::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRefunds::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_refunds_payment_id")
                                .from(PaymentRefunds::Table, PaymentRefunds::PaymentId)
                                .to(Payments::Table, Payments::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_refunds_payment_id")
                        .table(PaymentRefunds::Table)
                        .col(PaymentRefunds::PaymentId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentRefunds::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Payments {
        Table,
        Id,
        OrderId,
        VendorId,
        ParentPaymentId,
        Method,
        PaymentType,
        Status,
        Amount,
        VendorAmount,
        PlatformFee,
        Currency,
        IsSplitPayment,
        SplitDetails,
        TransactionId,
        ProcessedAt,
        GatewayResponse,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PaymentRefunds {
        Table,
        Id,
        PaymentId,
        Amount,
        Reason,
        Status,
        TransactionId,
        GatewayResponse,
        ProcessedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_vendor_settlements_table {

    use super::m20240301_000003_create_payment_tables::Payments;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_vendor_settlements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let precision = super::money_precision(manager);
            manager
                .create_table(
                    Table::create()
                        .table(VendorSettlements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(VendorSettlements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(VendorSettlements::VendorId).uuid().not_null())
                        .col(ColumnDef::new(VendorSettlements::PaymentId).uuid().not_null())
                        .col(
                            ColumnDef::new(VendorSettlements::Amount)
                                .decimal_len(precision, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VendorSettlements::Currency)
                                .string_len(3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VendorSettlements::PayoutMethod)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VendorSettlements::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(VendorSettlements::TransactionId).string().null())
                        .col(ColumnDef::new(VendorSettlements::Notes).text().null())
                        .col(
                            ColumnDef::new(VendorSettlements::Attempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(VendorSettlements::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(VendorSettlements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VendorSettlements::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_vendor_settlements_payment_id")
                                .from(VendorSettlements::Table, VendorSettlements::PaymentId)
                                .to(Payments::Table, Payments::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // At most one settlement per payment; concurrent runs collide here.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_vendor_settlements_payment_id")
                        .table(VendorSettlements::Table)
                        .col(VendorSettlements::PaymentId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_vendor_settlements_vendor_id")
                        .table(VendorSettlements::Table)
                        .col(VendorSettlements::VendorId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(VendorSettlements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum VendorSettlements {
        Table,
        Id,
        VendorId,
        PaymentId,
        Amount,
        Currency,
        PayoutMethod,
        Status,
        TransactionId,
        Notes,
        Attempts,
        ProcessedAt,
        CreatedAt,
        UpdatedAt,
    }
}
