use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_container_tables::Migration),
            Box::new(m20240301_000002_create_orders_tables::Migration),
            Box::new(m20240301_000003_create_shipments_tables::Migration),
            Box::new(m20240301_000004_create_order_activity_log_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_container_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_container_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Cart::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Cart::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Cart::OrdersCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Cart::IsAvailable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Cart::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Cart::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ShippingBox::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShippingBox::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ShippingBox::Number).string().not_null())
                        .col(
                            ColumnDef::new(ShippingBox::OrdersCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ShippingBox::IsAvailable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ShippingBox::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShippingBox::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseInvoices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseInvoices::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::InvoiceImageBase64)
                                .text()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseInvoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseInvoices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ShippingBox::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Cart::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Cart {
        Table,
        Id,
        OrdersCount,
        IsAvailable,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ShippingBox {
        #[sea_orm(iden = "box")]
        Table,
        Id,
        Number,
        OrdersCount,
        IsAvailable,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseInvoices {
        Table,
        Id,
        InvoiceImageBase64,
        CreatedAt,
    }
}

mod m20240301_000002_create_orders_tables {

    use super::m20240301_000001_create_container_tables::{Cart, PurchaseInvoices, ShippingBox};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Orders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Orders::CustomerId).integer().not_null())
                        .col(ColumnDef::new(Orders::CreatorUserId).integer().null())
                        .col(ColumnDef::new(Orders::CreatorCustomerId).integer().null())
                        .col(ColumnDef::new(Orders::CollectionId).integer().null())
                        .col(ColumnDef::new(Orders::CartId).integer().null())
                        .col(ColumnDef::new(Orders::BoxId).integer().null())
                        .col(ColumnDef::new(Orders::InvoiceId).integer().null())
                        .col(
                            ColumnDef::new(Orders::Position)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Orders::Barcode).string().null())
                        .col(ColumnDef::new(Orders::PurchaseMethod).string().null())
                        .col(
                            ColumnDef::new(Orders::IsArchived)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
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
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_cart")
                                .from(Orders::Table, Orders::CartId)
                                .to(Cart::Table, Cart::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_box")
                                .from(Orders::Table, Orders::BoxId)
                                .to(ShippingBox::Table, ShippingBox::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_invoice")
                                .from(Orders::Table, Orders::InvoiceId)
                                .to(PurchaseInvoices::Table, PurchaseInvoices::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            // Cascades filter on (anchor, position)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_cart_position")
                        .table(Orders::Table)
                        .col(Orders::CartId)
                        .col(Orders::Position)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_box_position")
                        .table(Orders::Table)
                        .col(Orders::BoxId)
                        .col(Orders::Position)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderDetails::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderDetails::OrderId).integer().not_null())
                        .col(ColumnDef::new(OrderDetails::Title).string().not_null())
                        .col(ColumnDef::new(OrderDetails::Description).text().null())
                        .col(ColumnDef::new(OrderDetails::Notes).text().null())
                        .col(ColumnDef::new(OrderDetails::Color).string().null())
                        .col(ColumnDef::new(OrderDetails::Size).string().null())
                        .col(ColumnDef::new(OrderDetails::Capacity).string().null())
                        .col(
                            ColumnDef::new(OrderDetails::PrepaidValue)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::OriginalProductPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::Commission)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::Total)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(OrderDetails::ImageUrl).string().null())
                        .col(
                            ColumnDef::new(OrderDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderDetails::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_details_order")
                                .from(OrderDetails::Table, OrderDetails::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_details_order_id")
                        .table(OrderDetails::Table)
                        .col(OrderDetails::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderDetails::Table).to_owned())
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
        CustomerId,
        CreatorUserId,
        CreatorCustomerId,
        CollectionId,
        CartId,
        BoxId,
        InvoiceId,
        Position,
        Barcode,
        PurchaseMethod,
        IsArchived,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderDetails {
        Table,
        Id,
        OrderId,
        Title,
        Description,
        Notes,
        Color,
        Size,
        Capacity,
        PrepaidValue,
        OriginalProductPrice,
        Commission,
        Total,
        ImageUrl,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_shipments_tables {

    use super::m20240301_000001_create_container_tables::ShippingBox;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_shipments_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Shipments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Shipments::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Shipments::BoxId).integer().not_null())
                        .col(ColumnDef::new(Shipments::CompanyId).integer().not_null())
                        .col(ColumnDef::new(Shipments::SenderName).string().not_null())
                        .col(
                            ColumnDef::new(Shipments::Weight)
                                .decimal_len(12, 3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Shipments::Status)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Shipments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Shipments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shipments_box")
                                .from(Shipments::Table, Shipments::BoxId)
                                .to(ShippingBox::Table, ShippingBox::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_shipments_box_status")
                        .table(Shipments::Table)
                        .col(Shipments::BoxId)
                        .col(Shipments::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ShipmentImages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShipmentImages::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ShipmentImages::ShipmentId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ShipmentImages::ImageData).text().not_null())
                        .col(
                            ColumnDef::new(ShipmentImages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shipment_images_shipment")
                                .from(ShipmentImages::Table, ShipmentImages::ShipmentId)
                                .to(Shipments::Table, Shipments::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ShipmentImages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Shipments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Shipments {
        Table,
        Id,
        BoxId,
        CompanyId,
        SenderName,
        Weight,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ShipmentImages {
        Table,
        Id,
        ShipmentId,
        ImageData,
        CreatedAt,
    }
}

mod m20240301_000004_create_order_activity_log_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_order_activity_log_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // No foreign key on entity_id: entries outlive deleted orders.
            manager
                .create_table(
                    Table::create()
                        .table(OrderActivityLog::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderActivityLog::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(OrderActivityLog::EntityType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderActivityLog::EntityId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderActivityLog::ActionType)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderActivityLog::FieldName).string().null())
                        .col(ColumnDef::new(OrderActivityLog::OldValue).text().null())
                        .col(ColumnDef::new(OrderActivityLog::NewValue).text().null())
                        .col(ColumnDef::new(OrderActivityLog::Details).json().null())
                        .col(ColumnDef::new(OrderActivityLog::ActorId).integer().null())
                        .col(
                            ColumnDef::new(OrderActivityLog::ActorType)
                                .string_len(16)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderActivityLog::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_activity_log_entity")
                        .table(OrderActivityLog::Table)
                        .col(OrderActivityLog::EntityType)
                        .col(OrderActivityLog::EntityId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderActivityLog::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderActivityLog {
        Table,
        Id,
        EntityType,
        EntityId,
        ActionType,
        FieldName,
        OldValue,
        NewValue,
        Details,
        ActorId,
        ActorType,
        CreatedAt,
    }
}
