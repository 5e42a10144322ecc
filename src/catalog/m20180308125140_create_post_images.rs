//! Migration: Create post images
//! Version: 20180308125140
//! Description: Creates post_images

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::{Column, Index, Table};

pub struct CreatePostImages;

impl Migration for CreatePostImages {
    fn name(&self) -> &str {
        "create_post_images"
    }

    fn version(&self) -> i64 {
        20180308125140
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.create_table(
            Table::new("post_images")
                .column(Column::integer("post_id"))
                .column(Column::string("url"))
                .column(Column::integer("height"))
                .column(Column::integer("width"))
                .timestamps(),
        )?;
        manager.add_index("post_images", Index::on("post_images", ["post_id"]))
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_table("post_images")
    }
}
