//! Migration: Add post image id to post tags
//! Version: 20180727100100
//! Description: Pins a tag to the image it was placed on

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::Column;

pub struct AddPostImageIdToPostTags;

impl Migration for AddPostImageIdToPostTags {
    fn name(&self) -> &str {
        "add_post_image_id_to_post_tags"
    }

    fn version(&self) -> i64 {
        20180727100100
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.add_column("post_tags", Column::integer("post_image_id"))
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_column("post_tags", "post_image_id")
    }
}
