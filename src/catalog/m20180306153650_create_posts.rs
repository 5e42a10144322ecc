//! Migration: Create posts
//! Version: 20180306153650
//! Description: Creates posts with the publication flags and the feed index

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::{Column, Index, Table};

pub struct CreatePosts;

impl Migration for CreatePosts {
    fn name(&self) -> &str {
        "create_posts"
    }

    fn version(&self) -> i64 {
        20180306153650
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.create_table(
            Table::new("posts")
                .column(Column::string("title"))
                .column(Column::text("description"))
                .column(Column::string("influencer_name"))
                .column(Column::boolean("published").default(false))
                .column(Column::date_time("first_published_at"))
                .column(Column::date_time("last_published_at"))
                .column(Column::integer("like_count").default(0))
                .column(Column::boolean("deleted").default(false))
                .column(Column::integer("score").default(0))
                .timestamps(),
        )?;
        manager.add_index("posts", Index::on("posts", ["deleted", "published"]))
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_table("posts")
    }
}
