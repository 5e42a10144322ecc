//! Migration: Create post likes
//! Version: 20180315211245
//! Description: Creates post_likes, one row per user and post

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::{Column, Index, Table};

pub struct CreatePostLikes;

impl Migration for CreatePostLikes {
    fn name(&self) -> &str {
        "create_post_likes"
    }

    fn version(&self) -> i64 {
        20180315211245
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.create_table(
            Table::new("post_likes")
                .column(Column::integer("post_id"))
                .column(Column::integer("bukalapak_user_id"))
                .column(Column::boolean("liked").default(true)),
        )?;
        manager.add_index(
            "post_likes",
            Index::new("index_post_likes_on_post_and_user", ["post_id", "bukalapak_user_id"]).unique(),
        )?;
        manager.add_index(
            "post_likes",
            Index::new(
                "index_post_likes_on_post_and_user_and_liked",
                ["post_id", "bukalapak_user_id", "liked"],
            ),
        )
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_table("post_likes")
    }
}
