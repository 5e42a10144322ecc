//! Migration: Create categories
//! Version: 20180612135932
//! Description: Creates categories with a per-category post count

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::{Column, Index, Table};

pub struct CreateCategories;

impl Migration for CreateCategories {
    fn name(&self) -> &str {
        "create_categories"
    }

    fn version(&self) -> i64 {
        20180612135932
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.create_table(
            Table::new("categories")
                .column(Column::integer("bukalapak_category_id").default(0))
                .column(Column::string("bukalapak_category_name"))
                .column(Column::integer("count").default(0))
                .timestamps(),
        )?;
        manager.add_index(
            "categories",
            Index::on("categories", ["bukalapak_category_id"]).unique(),
        )
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_table("categories")
    }
}
