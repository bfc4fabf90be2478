use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(pk_auto(User::Id))
                    .col(
                        ColumnDef::new(User::Username)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(string_len(User::Email, 255))
                    .col(string_len(User::Name, 255))
                    .col(string_len(User::Role, 255))
                    .col(string_len(User::Department, 255))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Company::Table)
                    .if_not_exists()
                    .col(pk_auto(Company::Id))
                    .col(timestamp_with_time_zone(Company::CreatedAt))
                    .col(timestamp_with_time_zone_null(Company::UpdatedAt))
                    .col(string_len(Company::Name, 255))
                    .col(string_len_null(Company::Website, 255))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Contact::Table)
                    .if_not_exists()
                    .col(pk_auto(Contact::Id))
                    .col(timestamp_with_time_zone(Contact::CreatedAt))
                    .col(timestamp_with_time_zone_null(Contact::UpdatedAt))
                    .col(string_len(Contact::FirstName, 255))
                    .col(string_len(Contact::LastName, 255))
                    .col(integer(Contact::OwnerId))
                    .col(integer(Contact::CompanyId))
                    .col(boolean(Contact::IsActive).default(false))
                    .col(boolean(Contact::MarketingOptIn).default(false))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contact_owner")
                            .from(Contact::Table, Contact::OwnerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contact_company")
                            .from(Contact::Table, Contact::CompanyId)
                            .to(Company::Table, Company::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_contact_owner")
                    .table(Contact::Table)
                    .col(Contact::OwnerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Contact::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Company::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum User {
    Table,
    Id,
    Username,
    Email,
    Name,
    Role,
    Department,
}

#[derive(DeriveIden)]
enum Company {
    Table,
    Id,
    CreatedAt,
    UpdatedAt,
    Name,
    Website,
}

#[derive(DeriveIden)]
enum Contact {
    Table,
    Id,
    CreatedAt,
    UpdatedAt,
    FirstName,
    LastName,
    OwnerId,
    CompanyId,
    IsActive,
    MarketingOptIn,
}
