//! Migration: Add influencer id to posts
//! Version: 20180725130653
//! Description: Links posts to influencers and indexes the per-influencer feed

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::{Column, Index};

pub struct AddInfluencerIdToPosts;

impl Migration for AddInfluencerIdToPosts {
    fn name(&self) -> &str {
        "add_influencer_id_to_posts"
    }

    fn version(&self) -> i64 {
        20180725130653
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.add_column("posts", Column::integer("influencer_id").default(0))?;
        manager.add_index("posts", Index::on("posts", ["influencer_id", "deleted", "published"]))
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_index("posts", "index_posts_on_influencer_id_and_deleted_and_published")?;
        manager.drop_column("posts", "influencer_id")
    }
}
