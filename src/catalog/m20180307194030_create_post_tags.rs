//! Migration: Create post tags
//! Version: 20180307194030
//! Description: Creates post_tags, the tagged points on a post

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::{Column, Index, Table};

pub struct CreatePostTags;

impl Migration for CreatePostTags {
    fn name(&self) -> &str {
        "create_post_tags"
    }

    fn version(&self) -> i64 {
        20180307194030
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.create_table(
            Table::new("post_tags")
                .column(Column::integer("post_id"))
                .column(Column::string("name"))
                .column(Column::string("url"))
                .column(Column::float("coord_x"))
                .column(Column::float("coord_y"))
                .timestamps(),
        )?;
        manager.add_index("post_tags", Index::on("post_tags", ["post_id"]))
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_table("post_tags")
    }
}
