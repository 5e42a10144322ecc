//! Migration: Create post filters
//! Version: 20180612134100
//! Description: Creates post_filters, the post to category mapping

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::{Column, Index, Table};

pub struct CreatePostFilters;

impl Migration for CreatePostFilters {
    fn name(&self) -> &str {
        "create_post_filters"
    }

    fn version(&self) -> i64 {
        20180612134100
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.create_table(
            Table::new("post_filters")
                .column(Column::integer("post_id"))
                .column(Column::integer("bukalapak_category_id").default(0)),
        )?;
        manager.add_index(
            "post_filters",
            Index::on("post_filters", ["post_id", "bukalapak_category_id"]).unique(),
        )
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_table("post_filters")
    }
}
